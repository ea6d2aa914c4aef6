//! Deadlines and timeout configuration.
//!
//! Every blocking operation in this crate is bounded by a [`Deadline`]: an
//! absolute point in time past which the operation must not block. A relative
//! timeout converts to a deadline with [`Deadline::after`]. The distinguished
//! duration [`INFINITE`] disables the bound entirely.

use std::time::{Duration, Instant};

/// Distinguished duration meaning "no deadline applies".
pub const INFINITE: Duration = Duration::MAX;

/// An absolute expiration point for one blocking operation.
///
/// `Deadline::INFINITE` never expires. A deadline in the past (including one
/// built from a zero timeout) still grants the operation a single
/// non-blocking chance to complete before it fails with
/// [`Error::Timeout`](crate::Error::Timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// The deadline that never expires.
    pub const INFINITE: Deadline = Deadline(None);

    /// Finest timeout granularity the reactor timer honors. Finite deadlines
    /// closer than this behave as already elapsed.
    pub const MIN_RESOLUTION: Duration = Duration::from_micros(2);

    /// Deadline at an absolute instant.
    pub fn at(instant: Instant) -> Self {
        Deadline(Some(instant))
    }

    /// Deadline `timeout` from now. [`INFINITE`] (or any duration too large
    /// to represent as an instant) yields `Deadline::INFINITE`.
    pub fn after(timeout: Duration) -> Self {
        if timeout == INFINITE {
            return Deadline::INFINITE;
        }
        match Instant::now().checked_add(timeout) {
            Some(at) => Deadline(Some(at)),
            None => Deadline::INFINITE,
        }
    }

    /// The underlying instant, or `None` for the infinite deadline.
    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    /// Time left before expiry. `None` means unbounded; a finite expired
    /// deadline reports `Some(Duration::ZERO)`.
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has effectively passed (less than
    /// [`MIN_RESOLUTION`](Self::MIN_RESOLUTION) remaining).
    pub fn expired(&self) -> bool {
        match self.remaining() {
            Some(left) => left < Self::MIN_RESOLUTION,
            None => false,
        }
    }

    /// The earlier of two deadlines.
    pub fn earliest(self, other: Deadline) -> Deadline {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Deadline(Some(a.min(b))),
            (Some(a), None) => Deadline(Some(a)),
            (None, b) => Deadline(b),
        }
    }
}

impl From<Duration> for Deadline {
    fn from(timeout: Duration) -> Self {
        Deadline::after(timeout)
    }
}

impl From<Instant> for Deadline {
    fn from(instant: Instant) -> Self {
        Deadline::at(instant)
    }
}

/// Timeout configuration shared by connectors, pools and the sessions they
/// produce.
///
/// `resolve` bounds one background DNS resolution, `connect` bounds session
/// establishment (including TLS handshake and HTTP connection setup), and
/// `io` bounds each I/O call on an established session unless the caller
/// passes a tighter explicit deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub resolve: Duration,
    pub connect: Duration,
    pub io: Duration,
}

impl Timeouts {
    pub fn new(resolve: Duration, connect: Duration, io: Duration) -> Self {
        Timeouts { resolve, connect, io }
    }

    /// Deadline for a connect attempt starting now.
    pub(crate) fn connect_deadline(&self) -> Deadline {
        Deadline::after(self.connect)
    }

    /// Deadline for an I/O call starting now.
    pub(crate) fn io_deadline(&self) -> Deadline {
        Deadline::after(self.io)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            resolve: Duration::from_secs(5),
            connect: Duration::from_secs(10),
            io: Duration::from_secs(5),
        }
    }
}
