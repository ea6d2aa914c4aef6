//! Deadline-bounded UDP session.
//!
//! "Connecting" a datagram socket only fixes the default peer; there is no
//! handshake, so the connect budget covers local socket setup alone.
//! `send`/`receive` move one whole datagram per call.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;

use crate::base::{Deadline, Endpoint, Error, Protocol, Result, Timeouts};
use crate::runtime;
use crate::log_trace;

use super::{Connect, Session};

#[derive(Debug)]
pub struct UdpSession {
    socket: Option<UdpSocket>,
    timeouts: Timeouts,
    io_timeout_enabled: bool,
}

impl UdpSession {
    /// Bind an ephemeral local port of the matching family and fix
    /// `endpoint` as the peer.
    pub fn connect(endpoint: Endpoint, timeouts: Timeouts, deadline: Deadline) -> Result<Self> {
        let local: SocketAddr = match endpoint.addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let budget = deadline.earliest(timeouts.connect_deadline());
        let socket = runtime::block_on_deadline(budget, async {
            let socket = UdpSocket::bind(local).await.map_err(Error::from_connect)?;
            socket.connect(endpoint.addr).await.map_err(Error::from_connect)?;
            Ok(socket)
        })?;
        log_trace!("udp socket bound for {endpoint}");

        Ok(UdpSession { socket: Some(socket), timeouts, io_timeout_enabled: true })
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn set_io_timeout_enabled(&mut self, enabled: bool) {
        self.io_timeout_enabled = enabled;
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let socket = self.socket.as_ref().ok_or(Error::Closed)?;
        socket.local_addr().map_err(Error::from_transport)
    }

    fn io_deadline(&self, deadline: Deadline) -> Deadline {
        if self.io_timeout_enabled {
            deadline.earliest(self.timeouts.io_deadline())
        } else {
            deadline
        }
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket.as_ref().ok_or(Error::Closed)
    }
}

impl super::Datagram for UdpSession {
    fn send_to(&mut self, data: &[u8], peer: SocketAddr, deadline: Deadline) -> Result<usize> {
        let deadline = self.io_deadline(deadline);
        let socket = self.socket()?;
        runtime::block_on_deadline(deadline, async {
            socket.send_to(data, peer).await.map_err(Error::from_transport)
        })
    }

    fn recv_from(&mut self, buf: &mut [u8], deadline: Deadline) -> Result<(usize, SocketAddr)> {
        let deadline = self.io_deadline(deadline);
        let socket = self.socket()?;
        runtime::block_on_deadline(deadline, async {
            socket.recv_from(buf).await.map_err(Error::from_transport)
        })
    }
}

impl Session for UdpSession {
    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn close(&mut self) -> Result<()> {
        self.socket.take();
        Ok(())
    }
}

impl super::Transfer for UdpSession {
    /// One datagram out; the returned count is the datagram size.
    fn send(&mut self, data: &[u8], deadline: Deadline) -> (usize, Result<()>) {
        let deadline = self.io_deadline(deadline);
        let socket = match self.socket() {
            Ok(socket) => socket,
            Err(err) => return (0, Err(err)),
        };
        let sent = runtime::block_on_deadline(deadline, async {
            socket.send(data).await.map_err(Error::from_transport)
        });
        match sent {
            Ok(n) => (n, Ok(())),
            Err(err) => (0, Err(err)),
        }
    }

    /// One datagram in; the returned count is the datagram size, which may be
    /// smaller than `buf`.
    fn receive(&mut self, buf: &mut [u8], deadline: Deadline) -> (usize, Result<()>) {
        let deadline = self.io_deadline(deadline);
        let socket = match self.socket() {
            Ok(socket) => socket,
            Err(err) => return (0, Err(err)),
        };
        let received = runtime::block_on_deadline(deadline, async {
            socket.recv(buf).await.map_err(Error::from_transport)
        });
        match received {
            Ok(n) => (n, Ok(())),
            Err(err) => (0, Err(err)),
        }
    }
}

impl Connect for UdpSession {
    type Options = ();

    fn protocol() -> Protocol {
        Protocol::Udp
    }

    fn connect(
        _host: &str,
        endpoint: Endpoint,
        timeouts: &Timeouts,
        _options: &Self::Options,
        deadline: Deadline,
    ) -> Result<Self> {
        UdpSession::connect(endpoint, *timeouts, deadline)
    }
}
