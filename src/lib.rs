//! # wirepool
//!
//! A deadline-bounded, blocking stream client for TCP, UDP, TLS-over-TCP and
//! HTTP/HTTPS, with a self-maintaining connection pool.
//!
//! Every blocking operation takes a [`Deadline`] (or a relative timeout
//! converted into one) and either completes or fails with a typed
//! [`Error::Timeout`]; nothing hangs indefinitely. Internally the crate
//! drives all I/O through one shared tokio reactor; no async surface is
//! exposed to callers.
//!
//! ## Features
//!
//! - **Timed sessions**: [`TcpSession`], [`UdpSession`], [`TlsSession`] and
//!   [`HttpSession`] with deadline-bounded connect, send/receive, short I/O
//!   and close
//! - **Resolving connector**: background DNS refresh with random endpoint
//!   selection ([`Connector`])
//! - **Connection pool**: FIFO hand-out, age-based eviction, pluggable
//!   refill ([`ConnectionPool`], [`Greedy`], [`ConservativeBackoff`])
//! - **Logging facade**: level-gated, pluggable sink ([`logger`])
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use wirepool::{
//!     Connector, ConnectionPool, Deadline, IpFamily, ResolveFlags, TcpSession,
//!     Timeouts, Transfer,
//! };
//!
//! let connector: Connector<TcpSession> = Connector::new(
//!     "example.com",
//!     80,
//!     Timeouts::default(),
//!     IpFamily::Any,
//!     ResolveFlags::default(),
//!     (),
//! );
//! let pool = ConnectionPool::new(4, Duration::from_secs(60), connector);
//!
//! let mut session = pool.get_session(Deadline::after(Duration::from_secs(5)))?;
//! let (sent, status) = session.send(b"ping", Deadline::after(Duration::from_secs(1)));
//! status?;
//! assert_eq!(sent, 4);
//! pool.return_session(session);
//! # Ok::<(), wirepool::Error>(())
//! ```
//!
//! ## Concurrency contract
//!
//! A session is exclusively owned by whoever holds it and is not safe for
//! concurrent use; pools and connectors are fully thread-safe. The only
//! long-lived background threads are one resolver thread per connector and
//! one watcher thread per pool.

pub mod base;
pub mod connector;
pub mod logger;
pub mod pool;
pub mod resolver;
pub mod stream;

mod runtime;

pub use base::{
    ConnectError, Deadline, DnsError, Endpoint, Error, Protocol, ProtocolError, Result,
    Timeouts, TlsError, TransportError, INFINITE,
};
pub use connector::{
    Connector, HttpConnector, HttpsConnector, TcpConnector, TlsConnector, UdpConnector,
};
pub use logger::{ConsoleSink, FuncSink, LogLevel, LogSink, TracingSink};
pub use pool::{
    ConnectionPool, ConservativeBackoff, Greedy, HttpConservativePool, HttpPool,
    HttpsConservativePool, HttpsPool, RefillStrategy, TcpConservativePool, TcpPool,
    TlsConservativePool, TlsPool, UdpConservativePool, UdpPool,
};
pub use resolver::{IpFamily, ResolveFlags, Resolver};
pub use stream::{
    ByteStream, Connect, Datagram, HttpOptions, HttpSession, HttpTransport, HttpsSession,
    Session, TcpSession, TlsOptions, TlsSession, Transfer, UdpSession,
};
