//! TLS adapter over a [`TcpSession`].
//!
//! Construction performs the client handshake inside the connect budget; one
//! scoped deadline covers the whole handshake even though it interleaves
//! reads and writes. Record-level I/O then follows the same deadline rules as
//! the plain socket. Shutdown sends `close_notify` and treats a peer that
//! truncated the stream (closed the transport without its own `close_notify`)
//! as a clean close.

use std::io::ErrorKind;
use std::sync::Arc;

use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::base::{Deadline, Endpoint, Error, Protocol, Result, Timeouts, TlsError};
use crate::runtime;
use crate::{log_debug, log_trace};

use super::tcp::TcpSession;
use super::{Connect, Session};

/// TLS construction options: trust anchors, verification mode, SNI override
/// and ALPN.
#[derive(Clone)]
pub struct TlsOptions {
    roots: Trust,
    verify_peer: bool,
    server_name: Option<String>,
    alpn: Vec<Vec<u8>>,
}

#[derive(Clone)]
enum Trust {
    WebPki,
    Custom(Arc<RootCertStore>),
}

impl TlsOptions {
    /// Verify the peer against the bundled webpki roots.
    pub fn new() -> Self {
        TlsOptions { roots: Trust::WebPki, verify_peer: true, server_name: None, alpn: Vec::new() }
    }

    /// Verify the peer against a caller-supplied trust store.
    pub fn with_root_store(roots: RootCertStore) -> Self {
        TlsOptions {
            roots: Trust::Custom(Arc::new(roots)),
            verify_peer: true,
            server_name: None,
            alpn: Vec::new(),
        }
    }

    /// Skip certificate verification entirely. The connection is still
    /// encrypted but the peer is unauthenticated.
    pub fn danger_disable_verification(mut self) -> Self {
        self.verify_peer = false;
        self
    }

    /// Use `name` for SNI and verification instead of the connector's host.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Advertise the given ALPN protocols during the handshake.
    pub fn alpn<I, P>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        self.alpn = protocols.into_iter().map(Into::into).collect();
        self
    }

    fn client_config(&self) -> Result<Arc<ClientConfig>> {
        let builder = ClientConfig::builder();
        let mut config = if self.verify_peer {
            let roots = match &self.roots {
                Trust::Custom(store) => Arc::clone(store),
                Trust::WebPki => {
                    let mut store = RootCertStore::empty();
                    store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                    Arc::new(store)
                }
            };
            builder.with_root_certificates(roots).with_no_client_auth()
        } else {
            let provider = rustls::crypto::ring::default_provider();
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCert::new(provider)))
                .with_no_client_auth()
        };
        config.alpn_protocols = self.alpn.clone();
        Ok(Arc::new(config))
    }

    fn resolve_server_name(&self, host: &str) -> Result<ServerName<'static>> {
        let name = self.server_name.as_deref().unwrap_or(host);
        ServerName::try_from(name.to_owned())
            .map_err(|err| Error::Tls(TlsError::Config(format!("invalid server name: {err}"))))
    }
}

impl Default for TlsOptions {
    fn default() -> Self {
        TlsOptions::new()
    }
}

impl std::fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsOptions")
            .field("verify_peer", &self.verify_peer)
            .field("server_name", &self.server_name)
            .field("alpn", &self.alpn.len())
            .finish_non_exhaustive()
    }
}

/// Verifier that accepts any certificate but still validates handshake
/// signatures, so the transport stays encrypted.
#[derive(Debug)]
struct AcceptAnyCert {
    provider: CryptoProvider,
}

impl AcceptAnyCert {
    fn new(provider: CryptoProvider) -> Self {
        AcceptAnyCert { provider }
    }
}

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// A TLS client stream over TCP with deadline-bounded operations.
pub struct TlsSession {
    stream: Option<TlsStream<TcpStream>>,
    timeouts: Timeouts,
    io_timeout_enabled: bool,
}

impl TlsSession {
    /// Connect the underlying TCP session and complete the TLS handshake,
    /// all within the earlier of `deadline` and `timeouts.connect`.
    pub fn connect(
        host: &str,
        endpoint: Endpoint,
        timeouts: Timeouts,
        options: &TlsOptions,
        deadline: Deadline,
    ) -> Result<Self> {
        let budget = deadline.earliest(timeouts.connect_deadline());
        let tcp = TcpSession::connect(endpoint, timeouts, budget)?;
        let transport = tcp.into_stream()?;

        let config = options.client_config()?;
        let name = options.resolve_server_name(host)?;
        let connector = TlsConnector::from(config);

        let stream = runtime::block_on_deadline(budget, async {
            connector
                .connect(name, transport)
                .await
                .map_err(|err| Error::Tls(TlsError::Handshake(err.to_string())))
        })?;
        log_trace!("TLS handshake complete with {host} at {endpoint}");

        Ok(TlsSession { stream: Some(stream), timeouts, io_timeout_enabled: true })
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn set_io_timeout_enabled(&mut self, enabled: bool) {
        self.io_timeout_enabled = enabled;
    }

    /// ALPN protocol the peer selected, if any.
    pub fn alpn_protocol(&self) -> Option<Vec<u8>> {
        let stream = self.stream.as_ref()?;
        stream.get_ref().1.alpn_protocol().map(|proto| proto.to_vec())
    }

    fn io_deadline(&self, deadline: Deadline) -> Deadline {
        if self.io_timeout_enabled {
            deadline.earliest(self.timeouts.io_deadline())
        } else {
            deadline
        }
    }

    fn stream_mut(&mut self) -> Result<&mut TlsStream<TcpStream>> {
        self.stream.as_mut().ok_or(Error::Closed)
    }

    /// Hand the encrypted transport to an adapter (HTTP). The session counts
    /// as closed afterwards.
    pub(crate) fn into_stream(mut self) -> Result<TlsStream<TcpStream>> {
        self.stream.take().ok_or(Error::Closed)
    }
}

impl std::fmt::Debug for TlsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSession")
            .field("open", &self.stream.is_some())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl Session for TlsSession {
    fn is_open(&self) -> bool {
        match &self.stream {
            Some(stream) => stream.get_ref().0.peer_addr().is_ok(),
            None => false,
        }
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let deadline = self.io_deadline(Deadline::INFINITE);
        let result = runtime::block_on_deadline(deadline, async {
            match stream.shutdown().await {
                Ok(()) => Ok(()),
                // Peer already tore the transport down (truncated stream, no
                // close_notify, or an abortive close); the session is over
                // either way.
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::UnexpectedEof
                            | ErrorKind::NotConnected
                            | ErrorKind::ConnectionReset
                            | ErrorKind::BrokenPipe
                    ) =>
                {
                    Ok(())
                }
                Err(err) => Err(Error::from_transport(err)),
            }
        });
        if let Err(err) = &result {
            log_debug!("TLS shutdown reported {err}");
        }
        result
    }
}

impl super::Transfer for TlsSession {
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

impl super::ByteStream for TlsSession {
    fn write_some(&mut self, data: &[u8], deadline: Deadline) -> Result<usize> {
        let deadline = self.io_deadline(deadline);
        super::write_once(self.stream_mut()?, data, deadline)
    }

    fn read_some(&mut self, buf: &mut [u8], deadline: Deadline) -> Result<usize> {
        let deadline = self.io_deadline(deadline);
        super::read_once(self.stream_mut()?, buf, deadline)
    }
}

impl Connect for TlsSession {
    type Options = TlsOptions;

    fn protocol() -> Protocol {
        Protocol::Tcp
    }

    fn connect(
        host: &str,
        endpoint: Endpoint,
        timeouts: &Timeouts,
        options: &Self::Options,
        deadline: Deadline,
    ) -> Result<Self> {
        TlsSession::connect(host, endpoint, *timeouts, options, deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_verify_with_webpki() {
        let options = TlsOptions::new();
        let config = options.client_config().unwrap();
        assert!(config.alpn_protocols.is_empty());
    }

    #[test]
    fn alpn_is_carried_into_config() {
        let options = TlsOptions::new().alpn([&b"http/1.1"[..]]);
        let config = options.client_config().unwrap();
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }

    #[test]
    fn unverified_options_build() {
        let options = TlsOptions::new().danger_disable_verification();
        assert!(options.client_config().is_ok());
    }

    #[test]
    fn server_name_override() {
        let options = TlsOptions::new().server_name("internal.test");
        let name = options.resolve_server_name("ignored.example").unwrap();
        assert_eq!(name, ServerName::try_from("internal.test").unwrap());
    }
}
