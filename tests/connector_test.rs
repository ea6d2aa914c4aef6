//! Connector behavior: endpoint refresh, single-attempt semantics and
//! accessors.

mod support;

use std::time::{Duration, Instant};

use wirepool::{
    Connector, Deadline, DnsError, Error, IpFamily, ResolveFlags, Session, TcpSession, Timeouts,
};

fn timeouts() -> Timeouts {
    Timeouts::new(Duration::from_secs(1), Duration::from_secs(1), Duration::from_secs(1))
}

#[test]
fn new_session_connects_to_literal_host() {
    let addr = support::echo_server();
    let connector: Connector<TcpSession> = Connector::new(
        "127.0.0.1",
        addr.port(),
        timeouts(),
        IpFamily::V4,
        ResolveFlags::default(),
        (),
    );

    let session = connector.new_session(Deadline::after(Duration::from_secs(2))).unwrap();
    assert!(session.is_open());
    assert_eq!(session.peer_addr().unwrap().port(), addr.port());
}

#[test]
fn accessors_reflect_construction() {
    let connector: Connector<TcpSession> = Connector::new(
        "127.0.0.1",
        4242,
        timeouts(),
        IpFamily::V4,
        ResolveFlags::default(),
        (),
    );
    assert_eq!(connector.host(), "127.0.0.1");
    assert_eq!(connector.port(), 4242);
    assert_eq!(connector.target(), "127.0.0.1:4242");
    assert_eq!(connector.timeouts().connect, Duration::from_secs(1));
}

#[test]
fn unresolvable_host_caches_error_and_fails_within_deadline() {
    // numeric_host forbids name lookup, so this host can never resolve and
    // no external DNS is consulted.
    let connector: Connector<TcpSession> = Connector::new(
        "endpoint.invalid",
        80,
        timeouts(),
        IpFamily::Any,
        ResolveFlags { numeric_host: true },
        (),
    );

    let started = Instant::now();
    let err = connector.new_session(Deadline::after(Duration::from_secs(2))).unwrap_err();
    assert_eq!(err, Error::Dns(DnsError::HostNotFound));
    assert!(started.elapsed() < Duration::from_secs(2));

    // The failure stays visible on the connector.
    assert_eq!(connector.resolve_error(), Some(Error::Dns(DnsError::HostNotFound)));
}

#[test]
fn refused_connect_propagates_without_internal_retry() {
    let addr = support::refused_endpoint();
    let connector: Connector<TcpSession> = Connector::new(
        "127.0.0.1",
        addr.port(),
        timeouts(),
        IpFamily::V4,
        ResolveFlags::default(),
        (),
    );

    // One attempt per call: a refused port fails promptly instead of looping
    // inside the connector.
    let started = Instant::now();
    let result = connector.new_session(Deadline::after(Duration::from_secs(5)));
    assert!(matches!(result, Err(Error::Connect(_))), "got {result:?}");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn default_budget_uses_connect_timeout() {
    let addr = support::echo_server();
    let connector: Connector<TcpSession> = Connector::new(
        "127.0.0.1",
        addr.port(),
        timeouts(),
        IpFamily::V4,
        ResolveFlags::default(),
        (),
    );
    let session = connector.new_session_default().unwrap();
    assert!(session.is_open());
}
