//! Session types and the trait seams the connector and pool are generic over.
//!
//! The hierarchy mirrors the capabilities of the concrete types:
//! [`Session`] is anything with an open/closed lifecycle, [`Transfer`] adds
//! byte-exact send/receive, [`ByteStream`] adds short reads and writes, and
//! [`Connect`] is the construct-connected path a [`Connector`](crate::Connector)
//! invokes. `TlsSession` layers on `TcpSession`; `HttpSession` layers on
//! either via [`HttpTransport`].

pub mod http;
pub mod tcp;
pub mod tls;
pub mod udp;

pub use self::http::{HttpOptions, HttpSession, HttpTransport, HttpsSession};
pub use self::tcp::TcpSession;
pub use self::tls::{TlsOptions, TlsSession};
pub use self::udp::UdpSession;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::base::{Deadline, Endpoint, Error, Protocol, Result, Timeouts, TransportError};
use crate::runtime;

/// A connected stream abstraction with an open → closed lifecycle.
///
/// A session is not safe for concurrent use; move it between threads between
/// operations. Once closed it never reopens, and every subsequent operation
/// fails with [`Error::Closed`].
pub trait Session: Send + 'static {
    /// Whether the session can still carry traffic. This is a cheap local
    /// check, not a liveness probe: the peer may have closed its end.
    fn is_open(&self) -> bool;

    /// Release the session. Idempotent; a second close returns `Ok`.
    fn close(&mut self) -> Result<()>;
}

/// Byte-exact transfers under one deadline.
///
/// Both operations report `(bytes_transferred, status)` so progress made
/// before a timeout or transport error stays observable.
pub trait Transfer: Session {
    /// Transfer the whole of `data`, looping over short writes until done or
    /// the deadline fires.
    fn send(&mut self, data: &[u8], deadline: Deadline) -> (usize, Result<()>);

    /// Fill the whole of `buf`, looping over short reads until done, EOF, or
    /// the deadline fires.
    fn receive(&mut self, buf: &mut [u8], deadline: Deadline) -> (usize, Result<()>);
}

/// Addressed datagram operations, for sockets that can also talk to peers
/// other than their fixed one.
pub trait Datagram: Transfer {
    /// Send one datagram to `peer`.
    fn send_to(
        &mut self,
        data: &[u8],
        peer: std::net::SocketAddr,
        deadline: Deadline,
    ) -> Result<usize>;

    /// Receive one datagram along with its source address.
    fn recv_from(
        &mut self,
        buf: &mut [u8],
        deadline: Deadline,
    ) -> Result<(usize, std::net::SocketAddr)>;
}

/// Short (single-operation) reads and writes.
pub trait ByteStream: Transfer {
    /// At most one underlying write; returns the bytes accepted.
    fn write_some(&mut self, data: &[u8], deadline: Deadline) -> Result<usize>;

    /// At most one underlying read; returns the bytes received, `Ok(0)` only
    /// for an empty buffer.
    fn read_some(&mut self, buf: &mut [u8], deadline: Deadline) -> Result<usize>;
}

/// The construct-connected path: how a connector turns an endpoint into a
/// ready session of this type.
pub trait Connect: Session + Sized {
    /// Protocol-specific construction options (trust stores, buffer limits).
    type Options: Clone + Send + Sync + 'static;

    /// Transport protocol this session type speaks, used to tag resolved
    /// endpoints.
    fn protocol() -> Protocol;

    /// Connect to `endpoint` within `deadline`, also honoring
    /// `timeouts.connect`. `host` is the logical peer name (TLS server name,
    /// HTTP Host); plain transports ignore it.
    fn connect(
        host: &str,
        endpoint: Endpoint,
        timeouts: &Timeouts,
        options: &Self::Options,
        deadline: Deadline,
    ) -> Result<Self>;
}

/// Shared byte-exact write loop: one deadline armed for the whole call.
pub(crate) fn send_all<S>(io: &mut S, data: &[u8], deadline: Deadline) -> (usize, Result<()>)
where
    S: AsyncWriteExt + Unpin,
{
    let mut written = 0usize;
    let status = runtime::block_on_deadline(deadline, async {
        while written < data.len() {
            match io.write(&data[written..]).await {
                Ok(0) => return Err(Error::Transport(TransportError::BrokenPipe)),
                Ok(n) => written += n,
                Err(err) => return Err(Error::from_transport(err)),
            }
        }
        Ok(())
    });
    (written, status)
}

/// Shared byte-exact read loop. EOF before the buffer fills reports
/// [`TransportError::EndOfStream`] with the bytes read so far.
pub(crate) fn recv_all<S>(io: &mut S, buf: &mut [u8], deadline: Deadline) -> (usize, Result<()>)
where
    S: AsyncReadExt + Unpin,
{
    let mut filled = 0usize;
    let total = buf.len();
    let status = runtime::block_on_deadline(deadline, async {
        while filled < total {
            match io.read(&mut buf[filled..]).await {
                Ok(0) => return Err(Error::Transport(TransportError::EndOfStream)),
                Ok(n) => filled += n,
                Err(err) => return Err(Error::from_transport(err)),
            }
        }
        Ok(())
    });
    (filled, status)
}

/// Shared single-write implementation.
pub(crate) fn write_once<S>(io: &mut S, data: &[u8], deadline: Deadline) -> Result<usize>
where
    S: AsyncWriteExt + Unpin,
{
    runtime::block_on_deadline(deadline, async {
        io.write(data).await.map_err(Error::from_transport)
    })
}

/// Shared single-read implementation. A zero-byte read on a non-empty buffer
/// is EOF and reported as [`TransportError::EndOfStream`].
pub(crate) fn read_once<S>(io: &mut S, buf: &mut [u8], deadline: Deadline) -> Result<usize>
where
    S: AsyncReadExt + Unpin,
{
    let wanted = buf.len();
    runtime::block_on_deadline(deadline, async {
        match io.read(buf).await {
            Ok(0) if wanted > 0 => Err(Error::Transport(TransportError::EndOfStream)),
            Ok(n) => Ok(n),
            Err(err) => Err(Error::from_transport(err)),
        }
    })
}
