//! HTTP/1.1 session over a plain or TLS transport.
//!
//! The HTTP codec is consumed as a black box: hyper serializes the request
//! and parses the response inside a read buffer bounded by
//! `header_limit + body_limit`, and [`HttpSession::perform`] drives one full
//! request/response exchange under a single deadline.

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::base::{
    Deadline, Endpoint, Error, Protocol, ProtocolError, Result, Timeouts, TransportError,
};
use crate::runtime;
use crate::{log_debug, log_trace};

use super::tcp::TcpSession;
use super::tls::TlsSession;
use super::{Connect, Session};

/// hyper rejects read buffers smaller than this.
const MIN_READ_BUF: usize = 8192;

/// Buffer limits plus the options of the underlying transport.
#[derive(Debug, Clone)]
pub struct HttpOptions<O = ()> {
    pub transport: O,
    /// Upper bound for the response head.
    pub header_limit: usize,
    /// Upper bound for the response body.
    pub body_limit: usize,
}

impl<O: Default> Default for HttpOptions<O> {
    fn default() -> Self {
        HttpOptions {
            transport: O::default(),
            header_limit: 16 * 1024,
            body_limit: 1024 * 1024,
        }
    }
}

impl<O> HttpOptions<O> {
    pub fn with_transport(transport: O) -> Self {
        HttpOptions { transport, header_limit: 16 * 1024, body_limit: 1024 * 1024 }
    }

    pub fn header_limit(mut self, limit: usize) -> Self {
        self.header_limit = limit;
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }
}

/// Transports an [`HttpSession`] can run on.
pub trait HttpTransport: Connect {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Surrender the raw transport for the codec to drive.
    fn into_io(self) -> Result<Self::Io>;
}

impl HttpTransport for TcpSession {
    type Io = tokio::net::TcpStream;

    fn into_io(self) -> Result<Self::Io> {
        self.into_stream()
    }
}

impl HttpTransport for TlsSession {
    type Io = tokio_rustls::client::TlsStream<tokio::net::TcpStream>;

    fn into_io(self) -> Result<Self::Io> {
        self.into_stream()
    }
}

/// One HTTP/1.1 connection ready to carry sequential request/response
/// exchanges.
pub struct HttpSession<T: HttpTransport = TcpSession> {
    sender: Option<http1::SendRequest<Full<Bytes>>>,
    driver: tokio::task::JoinHandle<()>,
    timeouts: Timeouts,
    body_limit: usize,
    _transport: std::marker::PhantomData<fn() -> T>,
}

/// HTTP over TLS.
pub type HttpsSession = HttpSession<TlsSession>;

impl<T: HttpTransport> HttpSession<T> {
    /// Connect the transport and perform the HTTP/1.1 connection setup within
    /// the earlier of `deadline` and `timeouts.connect`.
    pub fn connect(
        host: &str,
        endpoint: Endpoint,
        timeouts: Timeouts,
        options: &HttpOptions<T::Options>,
        deadline: Deadline,
    ) -> Result<Self> {
        let budget = deadline.earliest(timeouts.connect_deadline());
        let transport = T::connect(host, endpoint, &timeouts, &options.transport, budget)?;
        let io = TokioIo::new(transport.into_io()?);

        let read_buf = (options.header_limit + options.body_limit).max(MIN_READ_BUF);
        let (sender, conn) = runtime::block_on_deadline(budget, async {
            http1::Builder::new()
                .max_buf_size(read_buf)
                .handshake::<_, Full<Bytes>>(io)
                .await
                .map_err(map_hyper)
        })?;

        // The connection task owns the transport; aborting it is how close()
        // releases the socket.
        let driver = runtime::spawn(async move {
            if let Err(err) = conn.await {
                log_debug!("http connection ended with {err}");
            }
        });
        log_trace!("http session ready for {host} at {endpoint}");

        Ok(HttpSession {
            sender: Some(sender),
            driver,
            timeouts,
            body_limit: options.body_limit,
            _transport: std::marker::PhantomData,
        })
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Send `request` and read the complete response, all under `deadline`
    /// (capped at `timeouts.io` when `deadline` is infinite).
    ///
    /// A failed `perform` leaves the request state indeterminate; treat the
    /// session as tainted and do not return it to a pool.
    pub fn perform(
        &mut self,
        request: Request<Bytes>,
        deadline: Deadline,
    ) -> Result<Response<Bytes>> {
        let deadline = deadline.earliest(self.timeouts.io_deadline());
        let body_limit = self.body_limit;
        let sender = self.sender.as_mut().ok_or(Error::Closed)?;

        let (parts, body) = request.into_parts();
        let request = Request::from_parts(parts, Full::new(body));

        runtime::block_on_deadline(deadline, async {
            sender.ready().await.map_err(map_hyper)?;
            let response = sender.send_request(request).await.map_err(map_hyper)?;
            let (parts, body) = response.into_parts();
            let collected =
                Limited::new(body, body_limit).collect().await.map_err(map_body_error)?;
            Ok(Response::from_parts(parts, collected.to_bytes()))
        })
    }
}

impl<T: HttpTransport> Session for HttpSession<T> {
    fn is_open(&self) -> bool {
        match &self.sender {
            Some(sender) => !sender.is_closed() && !self.driver.is_finished(),
            None => false,
        }
    }

    fn close(&mut self) -> Result<()> {
        self.sender.take();
        self.driver.abort();
        Ok(())
    }
}

impl<T: HttpTransport> Connect for HttpSession<T> {
    type Options = HttpOptions<T::Options>;

    fn protocol() -> Protocol {
        T::protocol()
    }

    fn connect(
        host: &str,
        endpoint: Endpoint,
        timeouts: &Timeouts,
        options: &Self::Options,
        deadline: Deadline,
    ) -> Result<Self> {
        HttpSession::connect(host, endpoint, *timeouts, options, deadline)
    }
}

impl<T: HttpTransport> Drop for HttpSession<T> {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl<T: HttpTransport> std::fmt::Debug for HttpSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSession")
            .field("open", &self.sender.is_some())
            .field("body_limit", &self.body_limit)
            .finish_non_exhaustive()
    }
}

fn map_hyper(err: hyper::Error) -> Error {
    if err.is_parse_too_large() {
        Error::Protocol(ProtocolError::BufferOverflow)
    } else if err.is_parse() {
        Error::Protocol(ProtocolError::Parse(err.to_string()))
    } else if err.is_incomplete_message() {
        Error::Transport(TransportError::EndOfStream)
    } else if err.is_canceled() {
        Error::Cancelled
    } else if err.is_timeout() {
        Error::Timeout
    } else {
        Error::Transport(TransportError::Io(err.to_string()))
    }
}

fn map_body_error(err: Box<dyn std::error::Error + Send + Sync>) -> Error {
    if err.downcast_ref::<LengthLimitError>().is_some() {
        return Error::Protocol(ProtocolError::BufferOverflow);
    }
    match err.downcast::<hyper::Error>() {
        Ok(err) => map_hyper(*err),
        Err(err) => Error::Transport(TransportError::Io(err.to_string())),
    }
}
