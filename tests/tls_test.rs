//! TLS session behavior against an in-process tokio-rustls server with a
//! self-signed certificate.

mod support;

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rustls::ServerConfig;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wirepool::{
    Deadline, Endpoint, Error, Protocol, Session, Timeouts, TlsOptions, TlsSession, Transfer,
};

fn timeouts() -> Timeouts {
    Timeouts::new(Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(2))
}

fn self_signed() -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
    let key = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = key.cert.der().clone();
    let private = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(key.key_pair.serialize_der()));
    (cert, private)
}

/// TLS echo server on its own runtime thread. When `truncate` is set, each
/// connection is dropped after one echo without sending close_notify.
fn tls_echo_server(truncate: bool) -> SocketAddr {
    let (cert, private) = self_signed();
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert], private)
        .unwrap();
    let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(config));

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();

    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let Ok(mut tls) = acceptor.accept(stream).await else { return };
                    let mut buf = vec![0u8; 16384];
                    loop {
                        match tls.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if tls.write_all(&buf[..n]).await.is_err() {
                                    break;
                                }
                                if truncate {
                                    let _ = tls.flush().await;
                                    // Drop the transport without close_notify.
                                    let (stream, _) = tls.into_inner();
                                    drop(stream);
                                    return;
                                }
                            }
                        }
                    }
                    let _ = tls.shutdown().await;
                });
            }
        });
    });
    addr
}

fn options() -> TlsOptions {
    // The test certificate is self-signed, so verification runs against the
    // unauthenticated-but-encrypted mode.
    TlsOptions::new().danger_disable_verification().server_name("localhost")
}

#[test]
fn handshake_and_echo_round_trip() {
    let addr = tls_echo_server(false);
    let endpoint = Endpoint::new(addr, Protocol::Tcp);
    let mut session =
        TlsSession::connect("localhost", endpoint, timeouts(), &options(), Deadline::INFINITE)
            .unwrap();
    assert!(session.is_open());

    let data = b"over the encrypted wire".to_vec();
    let (sent, status) = session.send(&data, Deadline::after(Duration::from_secs(2)));
    status.unwrap();
    assert_eq!(sent, data.len());

    let mut received = vec![0u8; data.len()];
    let (got, status) = session.receive(&mut received, Deadline::after(Duration::from_secs(2)));
    status.unwrap();
    assert_eq!(got, data.len());
    assert_eq!(received, data);

    session.close().unwrap();
    assert!(!session.is_open());
}

#[test]
fn close_succeeds_when_peer_truncates_stream() {
    let addr = tls_echo_server(true);
    let endpoint = Endpoint::new(addr, Protocol::Tcp);
    let mut session =
        TlsSession::connect("localhost", endpoint, timeouts(), &options(), Deadline::INFINITE)
            .unwrap();

    let (_, status) = session.send(b"one echo", Deadline::after(Duration::from_secs(2)));
    status.unwrap();
    let mut buf = vec![0u8; 8];
    let (_, status) = session.receive(&mut buf, Deadline::after(Duration::from_secs(2)));
    status.unwrap();

    // Give the server a moment to drop the transport abruptly.
    thread::sleep(Duration::from_millis(100));
    // No close_notify arrived, only a truncated stream; close still reports
    // success.
    assert_eq!(session.close(), Ok(()));
}

#[test]
fn handshake_against_plain_listener_fails_typed() {
    // A plain TCP listener that answers nothing TLS-shaped.
    let addr = support::silent_server();
    let endpoint = Endpoint::new(addr, Protocol::Tcp);
    let short = Timeouts::new(
        Duration::from_secs(1),
        Duration::from_millis(500),
        Duration::from_secs(1),
    );

    let result = TlsSession::connect("localhost", endpoint, short, &options(), Deadline::INFINITE);
    match result {
        Err(Error::Timeout) | Err(Error::Tls(_)) => {}
        other => panic!("expected handshake failure, got {other:?}"),
    }
}

#[test]
fn invalid_server_name_is_config_error() {
    let addr = support::refused_endpoint();
    let endpoint = Endpoint::new(addr, Protocol::Tcp);
    // An IP literal is fine for SNI only as an IpAddress name; an empty name
    // is never valid.
    let bad = TlsOptions::new().server_name("");
    let result = TlsSession::connect("", endpoint, timeouts(), &bad, Deadline::INFINITE);
    match result {
        Err(Error::Tls(_)) | Err(Error::Connect(_)) => {}
        other => panic!("expected failure, got {other:?}"),
    }
}
