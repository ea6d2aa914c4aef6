use std::io;

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a public operation can report.
///
/// Platform error codes are translated into these kinds at the I/O boundary,
/// so callers match on behavior rather than OS identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Deadline reached before the operation completed.
    #[error("deadline reached before completion")]
    Timeout,

    /// Operation aborted because the underlying handle was closed mid-flight.
    #[error("operation aborted: underlying handle closed")]
    Cancelled,

    /// Pool stayed empty until the deadline. A transient, not a fault.
    #[error("no session available before the deadline")]
    NotFound,

    /// Name resolution failed.
    #[error("name resolution failed: {0}")]
    Dns(DnsError),

    /// Transport refused, unreachable or reset during connect.
    #[error("connect failed: {0}")]
    Connect(ConnectError),

    /// TLS handshake or certificate verification failure.
    #[error("TLS failure: {0}")]
    Tls(TlsError),

    /// Post-connect send/receive failure.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// HTTP-level failure: parse error or bounded-buffer overflow.
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// Operation attempted on an already-closed session.
    #[error("operation on a closed session")]
    Closed,
}

/// Sub-kinds of [`Error::Dns`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DnsError {
    #[error("host not found")]
    HostNotFound,
    #[error("temporary resolver failure, try again")]
    TryAgain,
    #[error("resolution timed out")]
    Timeout,
}

/// Sub-kinds of [`Error::Connect`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("connection refused")]
    Refused,
    #[error("host or network unreachable")]
    Unreachable,
    #[error("connection reset during connect")]
    Reset,
    #[error("{0}")]
    Other(String),
}

/// Sub-kinds of [`Error::Tls`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TlsError {
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("invalid TLS configuration: {0}")]
    Config(String),
}

/// Sub-kinds of [`Error::Transport`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection reset by peer")]
    Reset,
    #[error("broken pipe")]
    BrokenPipe,
    #[error("end of stream")]
    EndOfStream,
    #[error("{0}")]
    Io(String),
}

/// Sub-kinds of [`Error::Protocol`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("bounded buffer exhausted")]
    BufferOverflow,
    #[error("parse error: {0}")]
    Parse(String),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout | Error::Dns(DnsError::Timeout))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    /// Translate an I/O error observed on an established stream.
    pub(crate) fn from_transport(err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::ConnectionReset => Error::Transport(TransportError::Reset),
            io::ErrorKind::ConnectionAborted => Error::Cancelled,
            io::ErrorKind::BrokenPipe => Error::Transport(TransportError::BrokenPipe),
            io::ErrorKind::UnexpectedEof => Error::Transport(TransportError::EndOfStream),
            io::ErrorKind::TimedOut => Error::Timeout,
            io::ErrorKind::NotConnected => Error::Closed,
            _ => Error::Transport(TransportError::Io(err.to_string())),
        }
    }

    /// Translate an I/O error observed while establishing a connection.
    pub(crate) fn from_connect(err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Error::Connect(ConnectError::Refused),
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                Error::Connect(ConnectError::Unreachable)
            }
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                Error::Connect(ConnectError::Reset)
            }
            io::ErrorKind::TimedOut => Error::Timeout,
            _ => Error::Connect(ConnectError::Other(err.to_string())),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::from_transport(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_translation() {
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert_eq!(Error::from_transport(reset), Error::Transport(TransportError::Reset));

        let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert_eq!(Error::from_transport(eof), Error::Transport(TransportError::EndOfStream));

        let gone = io::Error::from(io::ErrorKind::NotConnected);
        assert_eq!(Error::from_transport(gone), Error::Closed);
    }

    #[test]
    fn connect_translation() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(Error::from_connect(refused), Error::Connect(ConnectError::Refused));

        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(Error::from_connect(timed_out), Error::Timeout);
    }

    #[test]
    fn timeout_predicate_covers_dns_timeout() {
        assert!(Error::Timeout.is_timeout());
        assert!(Error::Dns(DnsError::Timeout).is_timeout());
        assert!(!Error::NotFound.is_timeout());
    }
}
