//! Deadline-bounded TCP session.

use std::net::Shutdown;

use socket2::SockRef;
use tokio::net::TcpStream;

use crate::base::{Deadline, Endpoint, Error, Protocol, Result, Timeouts};
use crate::runtime;
use crate::{log_debug, log_trace};

use super::{Connect, Session};

/// A connected TCP stream with every operation bounded by a deadline.
///
/// While `io_timeout` is enabled (the default), each I/O call is additionally
/// capped at `timeouts.io` from its start, so a caller passing
/// [`Deadline::INFINITE`] still cannot hang.
#[derive(Debug)]
pub struct TcpSession {
    stream: Option<TcpStream>,
    timeouts: Timeouts,
    io_timeout_enabled: bool,
}

impl TcpSession {
    /// Connect to `endpoint`, bounded by the earlier of `deadline` and
    /// `timeouts.connect`. The I/O timeout never applies to the connect
    /// itself.
    ///
    /// On success the socket has `SO_KEEPALIVE` and `TCP_NODELAY` set, plus
    /// `TCP_QUICKACK` on Linux.
    pub fn connect(endpoint: Endpoint, timeouts: Timeouts, deadline: Deadline) -> Result<Self> {
        let budget = deadline.earliest(timeouts.connect_deadline());
        let stream = runtime::block_on_deadline(budget, async {
            TcpStream::connect(endpoint.addr).await.map_err(Error::from_connect)
        })?;

        configure(&stream)?;
        log_trace!("connected to {endpoint}");

        Ok(TcpSession { stream: Some(stream), timeouts, io_timeout_enabled: true })
    }

    /// Timeout configuration this session was built with.
    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Enable or disable the per-call I/O timeout cap.
    pub fn set_io_timeout_enabled(&mut self, enabled: bool) {
        self.io_timeout_enabled = enabled;
    }

    /// Local address of the underlying socket.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        let stream = self.stream.as_ref().ok_or(Error::Closed)?;
        stream.local_addr().map_err(Error::from_transport)
    }

    /// Peer address of the underlying socket.
    pub fn peer_addr(&self) -> Result<std::net::SocketAddr> {
        let stream = self.stream.as_ref().ok_or(Error::Closed)?;
        stream.peer_addr().map_err(Error::from_transport)
    }

    fn io_deadline(&self, deadline: Deadline) -> Deadline {
        if self.io_timeout_enabled {
            deadline.earliest(self.timeouts.io_deadline())
        } else {
            deadline
        }
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(Error::Closed)
    }

    /// Hand the raw transport to an adapter (TLS, HTTP). The session counts
    /// as closed afterwards.
    pub(crate) fn into_stream(mut self) -> Result<TcpStream> {
        self.stream.take().ok_or(Error::Closed)
    }
}

fn configure(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true).map_err(Error::from_connect)?;
    let sock = SockRef::from(stream);
    sock.set_keepalive(true).map_err(Error::from_connect)?;
    #[cfg(target_os = "linux")]
    sock.set_quickack(true).map_err(Error::from_connect)?;
    Ok(())
}

impl Session for TcpSession {
    fn is_open(&self) -> bool {
        match &self.stream {
            Some(stream) => stream.peer_addr().is_ok(),
            None => false,
        }
    }

    fn close(&mut self) -> Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        // Shutdown both directions first so the peer sees an orderly FIN; a
        // socket the peer already dropped reports "not connected", which is
        // not an error here.
        let sock = SockRef::from(&stream);
        match sock.shutdown(Shutdown::Both) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => {}
            Err(err) => {
                log_debug!("tcp shutdown reported {err}");
            }
        }
        drop(stream);
        Ok(())
    }
}

impl super::Transfer for TcpSession {
    fn send(&mut self, data: &[u8], deadline: Deadline) -> (usize, Result<()>) {
        let deadline = self.io_deadline(deadline);
        let stream = match self.stream_mut() {
            Ok(stream) => stream,
            Err(err) => return (0, Err(err)),
        };
        super::send_all(stream, data, deadline)
    }

    fn receive(&mut self, buf: &mut [u8], deadline: Deadline) -> (usize, Result<()>) {
        let deadline = self.io_deadline(deadline);
        let stream = match self.stream_mut() {
            Ok(stream) => stream,
            Err(err) => return (0, Err(err)),
        };
        super::recv_all(stream, buf, deadline)
    }
}

impl super::ByteStream for TcpSession {
    fn write_some(&mut self, data: &[u8], deadline: Deadline) -> Result<usize> {
        let deadline = self.io_deadline(deadline);
        super::write_once(self.stream_mut()?, data, deadline)
    }

    fn read_some(&mut self, buf: &mut [u8], deadline: Deadline) -> Result<usize> {
        let deadline = self.io_deadline(deadline);
        super::read_once(self.stream_mut()?, buf, deadline)
    }
}

impl Connect for TcpSession {
    type Options = ();

    fn protocol() -> Protocol {
        Protocol::Tcp
    }

    fn connect(
        _host: &str,
        endpoint: Endpoint,
        timeouts: &Timeouts,
        _options: &Self::Options,
        deadline: Deadline,
    ) -> Result<Self> {
        TcpSession::connect(endpoint, *timeouts, deadline)
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
