//! Session factory with a self-refreshing endpoint set.
//!
//! A [`Connector`] owns a background thread that re-resolves the target
//! whenever asked: at startup, when
//! [`Connector::new_session`] finds the endpoint set empty, and after any
//! failed connection attempt, since stale endpoints are a plausible cause.
//! Each `new_session` call makes exactly one connection attempt against a
//! uniformly random endpoint; retrying is the caller's (or the pool
//! strategy's) decision.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rand::Rng;

use crate::base::{Deadline, DnsError, Endpoint, Error, Protocol, Result, Timeouts};
use crate::resolver::{IpFamily, ResolveFlags, Resolver};
use crate::stream::{Connect, HttpSession, HttpsSession, TcpSession, TlsSession, UdpSession};
use crate::{log_debug, log_info, log_warn};

/// How long the resolve thread sleeps between shutdown checks while idle.
const RESOLVE_WAIT_SLICE: Duration = Duration::from_millis(100);

/// State shared between the connector, its resolve thread, and strategy
/// worker threads.
struct Shared {
    endpoints: Mutex<Vec<Endpoint>>,
    resolve_error: Mutex<Option<Error>>,
    resolve_needed: Mutex<bool>,
    resolve_needed_cv: Condvar,
    resolve_done: Mutex<bool>,
    resolve_done_cv: Condvar,
    running: AtomicBool,
}

impl Shared {
    fn snapshot(&self) -> Vec<Endpoint> {
        self.endpoints.lock().clone()
    }

    /// Ask the resolve thread for a fresh endpoint set.
    fn request_resolve(&self) {
        *self.resolve_done.lock() = false;
        *self.resolve_needed.lock() = true;
        self.resolve_needed_cv.notify_all();
    }

    /// Wait until the resolve thread finishes a pass or `deadline` elapses.
    fn wait_resolve_done(&self, deadline: Deadline) -> bool {
        let mut done = self.resolve_done.lock();
        while !*done {
            match deadline.instant() {
                Some(at) => {
                    if self.resolve_done_cv.wait_until(&mut done, at).timed_out() {
                        return *done;
                    }
                }
                None => self.resolve_done_cv.wait(&mut done),
            }
        }
        true
    }

    fn finish_resolve(&self) {
        *self.resolve_done.lock() = true;
        self.resolve_done_cv.notify_all();
    }
}

/// Produces connected sessions of type `C` against a named target.
///
/// Thread-safe; a single instance supports concurrent `new_session` calls.
pub struct Connector<C: Connect> {
    host: String,
    port: u16,
    timeouts: Timeouts,
    options: C::Options,
    shared: Arc<Shared>,
    resolve_thread: Option<thread::JoinHandle<()>>,
}

impl<C: Connect> Connector<C> {
    /// Create a connector and start its background resolve thread. No
    /// connection is established until [`new_session`](Self::new_session).
    pub fn new(
        host: impl Into<String>,
        port: u16,
        timeouts: Timeouts,
        family: IpFamily,
        flags: ResolveFlags,
        options: C::Options,
    ) -> Self {
        let host = host.into();
        let shared = Arc::new(Shared {
            endpoints: Mutex::new(Vec::new()),
            resolve_error: Mutex::new(None),
            // The thread resolves once immediately at startup.
            resolve_needed: Mutex::new(true),
            resolve_needed_cv: Condvar::new(),
            resolve_done: Mutex::new(false),
            resolve_done_cv: Condvar::new(),
            running: AtomicBool::new(true),
        });

        let resolver = Resolver::new(host.clone(), port, family, flags);
        let resolve_timeout = timeouts.resolve;
        let protocol = C::protocol();
        let thread_shared = Arc::clone(&shared);
        let resolve_thread = thread::Builder::new()
            .name(format!("wirepool-resolve-{host}"))
            .spawn(move || resolve_routine(thread_shared, resolver, resolve_timeout, protocol))
            .ok();
        if resolve_thread.is_none() {
            log_warn!("failed to spawn resolve thread for {host}:{port}");
        }

        Connector { host, port, timeouts, options, shared, resolve_thread }
    }

    /// Remote hostname.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Remote port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Remote target formatted as `host:port`.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Timeout configuration handed to every session.
    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Error of the most recent failed resolution, if the last pass failed.
    /// Cleared by the next successful pass.
    pub fn resolve_error(&self) -> Option<Error> {
        self.shared.resolve_error.lock().clone()
    }

    /// Establish one new session, blocking until connected, failed, or
    /// `deadline`.
    ///
    /// An empty endpoint set triggers a resolution and waits for it (within
    /// the deadline) before attempting. Exactly one endpoint is tried per
    /// call; on failure a background re-resolve is requested and the error
    /// propagates to the caller.
    pub fn new_session(&self, deadline: Deadline) -> Result<C> {
        let mut endpoints = self.shared.snapshot();
        if endpoints.is_empty() {
            self.shared.request_resolve();
            self.shared.wait_resolve_done(deadline);
            endpoints = self.shared.snapshot();
        }
        if endpoints.is_empty() {
            let err = self
                .resolve_error()
                .unwrap_or(if deadline.expired() {
                    Error::Timeout
                } else {
                    Error::Dns(DnsError::HostNotFound)
                });
            log_debug!("no endpoints for {}: {err}", self.target());
            return Err(err);
        }

        let endpoint = endpoints[rand::thread_rng().gen_range(0..endpoints.len())];
        match C::connect(&self.host, endpoint, &self.timeouts, &self.options, deadline) {
            Ok(session) => Ok(session),
            Err(err) => {
                // Stale endpoints are a plausible cause; refresh for the next
                // attempt.
                self.shared.request_resolve();
                log_debug!("connect to {endpoint} failed: {err}");
                Err(err)
            }
        }
    }

    /// [`new_session`](Self::new_session) with the default connect timeout.
    pub fn new_session_default(&self) -> Result<C> {
        self.new_session(self.timeouts.connect_deadline())
    }
}

impl<C: Connect> Drop for Connector<C> {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.resolve_needed_cv.notify_all();
        if let Some(thread) = self.resolve_thread.take() {
            let _ = thread.join();
        }
    }
}

impl<C: Connect> std::fmt::Debug for Connector<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

fn resolve_routine(
    shared: Arc<Shared>,
    mut resolver: Resolver,
    resolve_timeout: Duration,
    protocol: Protocol,
) {
    loop {
        {
            let mut needed = shared.resolve_needed.lock();
            while !*needed {
                if !shared.running.load(Ordering::Acquire) {
                    return;
                }
                // Timed slices so a shutdown without a wakeup is still seen.
                shared.resolve_needed_cv.wait_for(&mut needed, RESOLVE_WAIT_SLICE);
            }
            *needed = false;
        }
        if !shared.running.load(Ordering::Acquire) {
            return;
        }

        match resolver.resolve(Deadline::after(resolve_timeout)) {
            Ok(addrs) => {
                let count = addrs.len();
                let endpoints: Vec<Endpoint> =
                    addrs.into_iter().map(|addr| Endpoint::new(addr, protocol)).collect();
                *shared.endpoints.lock() = endpoints;
                *shared.resolve_error.lock() = None;
                log_info!("{} refreshed to {count} endpoint(s)", resolver.host());
            }
            Err(err) => {
                log_warn!("resolving {} failed: {err}", resolver.host());
                *shared.resolve_error.lock() = Some(err);
            }
        }
        shared.finish_resolve();
    }
}

/// Connector for plain TCP sessions.
pub type TcpConnector = Connector<TcpSession>;
/// Connector for plain UDP sessions.
pub type UdpConnector = Connector<UdpSession>;
/// Connector for TLS sessions.
pub type TlsConnector = Connector<TlsSession>;
/// Connector for HTTP sessions.
pub type HttpConnector = Connector<HttpSession>;
/// Connector for HTTPS sessions.
pub type HttpsConnector = Connector<HttpsSession>;
