//! Base types shared across the crate.
//!
//! Provides the foundational vocabulary every other module speaks:
//! - [`Error`]: platform-independent failure kinds
//! - [`Deadline`] / [`Timeouts`]: absolute and relative time bounds
//! - [`Endpoint`]: a connectable (protocol, IP, port) triple

pub mod deadline;
pub mod error;

pub use deadline::{Deadline, Timeouts, INFINITE};
pub use error::{ConnectError, DnsError, Error, ProtocolError, Result, TlsError, TransportError};

use std::fmt;
use std::net::SocketAddr;

/// Transport protocol tag of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

/// A connectable remote address: (IP, port, protocol). Immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub addr: SocketAddr,
    pub protocol: Protocol,
}

impl Endpoint {
    pub fn new(addr: SocketAddr, protocol: Protocol) -> Self {
        Endpoint { addr, protocol }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.addr)
    }
}
