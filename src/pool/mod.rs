//! Self-replenishing pool of connected sessions.
//!
//! The pool keeps up to `target_size` idle sessions in FIFO order and runs a
//! watcher thread that evicts entries past `idle_timeout` and asks its
//! [`RefillStrategy`] to fill vacancies. Steady-state population can briefly
//! reach `target_size + 1`: a caller may return a session the watcher has
//! already replaced.
//!
//! FIFO hand-out (oldest first) keeps every pooled session exercised, which
//! surfaces server-side closures sooner.

pub mod strategy;

pub use strategy::{ConservativeBackoff, Greedy, RefillStrategy};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::base::{Deadline, Error, Result, INFINITE};
use crate::connector::Connector;
use crate::log_warn;
use crate::stream::{Connect, HttpSession, HttpsSession, TcpSession, TlsSession, UdpSession};

/// Cadence of the watcher loop when the last cycle had no pending work.
const WATCH_PERIOD: Duration = Duration::from_millis(50);
/// Lock budget for one watcher cycle; contention skips the cycle.
const WATCH_LOCK_TIMEOUT: Duration = Duration::from_millis(100);
/// Lock budget for returning a session. A caller unable to return quickly is
/// better served constructing a fresh connection than waiting here.
const RETURN_LOCK_TIMEOUT: Duration = Duration::from_millis(1);

struct Shared<C> {
    entries: Mutex<VecDeque<(Instant, C)>>,
    available: Condvar,
    target_size: usize,
    idle_timeout: Duration,
    running: AtomicBool,
}

/// A pool of ready-to-use sessions against one resolved target.
///
/// Thread-safe; a single instance supports concurrent operation.
pub struct ConnectionPool<C: Connect, R: RefillStrategy<C> = Greedy> {
    shared: Arc<Shared<C>>,
    connector: Arc<Connector<C>>,
    watcher: Option<thread::JoinHandle<()>>,
    _strategy: std::marker::PhantomData<fn() -> R>,
}

impl<C: Connect> ConnectionPool<C, Greedy> {
    /// Pool of `target_size` sessions, each evicted once idle for
    /// `idle_timeout`, refilled greedily. Pass [`INFINITE`] to never evict by
    /// age.
    ///
    /// Starts the watcher immediately; `get_session` calls made before the
    /// first refill completes will block up to their deadline.
    pub fn new(target_size: usize, idle_timeout: Duration, connector: Connector<C>) -> Self {
        Self::with_strategy(target_size, idle_timeout, connector, Greedy)
    }

    /// Pool that never evicts sessions by age.
    pub fn without_eviction(target_size: usize, connector: Connector<C>) -> Self {
        Self::new(target_size, INFINITE, connector)
    }
}

impl<C: Connect, R: RefillStrategy<C>> ConnectionPool<C, R> {
    /// Pool with an explicit refill strategy.
    pub fn with_strategy(
        target_size: usize,
        idle_timeout: Duration,
        connector: Connector<C>,
        strategy: R,
    ) -> Self {
        let shared = Arc::new(Shared {
            entries: Mutex::new(VecDeque::with_capacity(target_size + 1)),
            available: Condvar::new(),
            target_size,
            idle_timeout,
            running: AtomicBool::new(true),
        });
        let connector = Arc::new(connector);

        let watch_shared = Arc::clone(&shared);
        let watch_connector = Arc::clone(&connector);
        let watcher = thread::Builder::new()
            .name(format!("wirepool-watch-{}", connector.target()))
            .spawn(move || watch_routine(watch_shared, watch_connector, strategy))
            .ok();
        if watcher.is_none() {
            log_warn!("failed to spawn pool watcher for {}", connector.target());
        }

        ConnectionPool { shared, connector, watcher, _strategy: std::marker::PhantomData }
    }

    /// The connector this pool refills through.
    pub fn connector(&self) -> &Connector<C> {
        &self.connector
    }

    /// Number of sessions the watcher keeps ready.
    pub fn target_size(&self) -> usize {
        self.shared.target_size
    }

    /// Resolve timeout of the underlying connector.
    pub fn resolve_timeout(&self) -> Duration {
        self.connector.timeouts().resolve
    }

    /// Connect timeout of the underlying connector, also the default budget
    /// for the no-argument convenience calls.
    pub fn connect_timeout(&self) -> Duration {
        self.connector.timeouts().connect
    }

    /// I/O timeout sessions in this pool were built with.
    pub fn io_timeout(&self) -> Duration {
        self.connector.timeouts().io
    }

    /// Pull the oldest session, waiting until one is available or `deadline`.
    ///
    /// Fails with [`Error::Timeout`] when the pool lock cannot be acquired in
    /// time and [`Error::NotFound`] when the pool is still empty at the
    /// deadline. The returned session was established earlier and may have
    /// been closed by the server since; handle I/O failures by getting a
    /// fresh session.
    pub fn get_session(&self, deadline: Deadline) -> Result<C> {
        let mut entries = self.lock_until(deadline)?;
        loop {
            if let Some((_, session)) = entries.pop_front() {
                return Ok(session);
            }
            match deadline.instant() {
                Some(at) => {
                    if self.shared.available.wait_until(&mut entries, at).timed_out() {
                        return match entries.pop_front() {
                            Some((_, session)) => Ok(session),
                            None => Err(Error::NotFound),
                        };
                    }
                }
                None => self.shared.available.wait(&mut entries),
            }
        }
    }

    /// [`get_session`](Self::get_session) with the connector's connect
    /// timeout as the budget.
    pub fn get_session_default(&self) -> Result<C> {
        self.get_session(Deadline::after(self.connect_timeout()))
    }

    /// Pull the oldest session if one is already present; never waits for a
    /// refill. The deadline only bounds lock acquisition.
    pub fn try_get_session(&self, deadline: Deadline) -> Result<C> {
        let mut entries = self.lock_until(deadline)?;
        match entries.pop_front() {
            Some((_, session)) => Ok(session),
            None => Err(Error::NotFound),
        }
    }

    /// Return a previously pulled session for reuse.
    ///
    /// Closed sessions are dropped silently. If the pool lock is contended
    /// beyond a short budget the session is dropped too; the watcher will
    /// replace it.
    pub fn return_session(&self, session: C) {
        if !session.is_open() {
            return;
        }
        if let Some(mut entries) = self.shared.entries.try_lock_for(RETURN_LOCK_TIMEOUT) {
            entries.push_back((Instant::now(), session));
            drop(entries);
            self.shared.available.notify_one();
        }
    }

    /// Whether at least one session is present, waiting up to `deadline` for
    /// the pool to become non-empty. Fails with [`Error::Timeout`] only when
    /// the pool lock cannot be acquired.
    pub fn is_connected(&self, deadline: Deadline) -> Result<bool> {
        let mut entries = self.lock_until(deadline)?;
        loop {
            if !entries.is_empty() {
                return Ok(true);
            }
            match deadline.instant() {
                Some(at) => {
                    if self.shared.available.wait_until(&mut entries, at).timed_out() {
                        return Ok(!entries.is_empty());
                    }
                }
                None => self.shared.available.wait(&mut entries),
            }
        }
    }

    /// [`is_connected`](Self::is_connected) with the connector's connect
    /// timeout as the budget.
    pub fn is_connected_default(&self) -> Result<bool> {
        self.is_connected(Deadline::after(self.connect_timeout()))
    }

    /// Sessions currently idle in the pool.
    pub fn idle_count(&self) -> usize {
        self.shared.entries.lock().len()
    }

    /// Stop the watcher and drop every pooled session. Idempotent; the pool
    /// stays empty afterwards and `get_session` reports
    /// [`Error::NotFound`] once its deadline elapses.
    pub fn close(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.join();
        }
        self.shared.entries.lock().clear();
    }

    fn lock_until(&self, deadline: Deadline) -> Result<MutexGuard<'_, VecDeque<(Instant, C)>>> {
        match deadline.instant() {
            Some(at) => self.shared.entries.try_lock_until(at).ok_or(Error::Timeout),
            None => Ok(self.shared.entries.lock()),
        }
    }
}

impl<C: Connect, R: RefillStrategy<C>> Drop for ConnectionPool<C, R> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: Connect, R: RefillStrategy<C>> std::fmt::Debug for ConnectionPool<C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("target", &self.connector.target())
            .field("target_size", &self.shared.target_size)
            .field("idle", &self.idle_count())
            .finish_non_exhaustive()
    }
}

fn watch_routine<C: Connect, R: RefillStrategy<C>>(
    shared: Arc<Shared<C>>,
    connector: Arc<Connector<C>>,
    mut strategy: R,
) {
    while shared.running.load(Ordering::Acquire) {
        let mut work_pending = false;

        if let Some(mut entries) = shared.entries.try_lock_for(WATCH_LOCK_TIMEOUT) {
            if shared.idle_timeout != INFINITE {
                let now = Instant::now();
                entries.retain(|(deposited, _)| {
                    now.saturating_duration_since(*deposited) < shared.idle_timeout
                });
            }
            let survivors = entries.len();
            drop(entries);

            let vacant = shared.target_size.saturating_sub(survivors);
            if vacant > 0 {
                let append = |session: C| {
                    let mut entries = shared.entries.lock();
                    entries.push_back((Instant::now(), session));
                    drop(entries);
                    shared.available.notify_one();
                };
                work_pending = strategy.refill(&connector, vacant, &append);
            }
        }

        if !work_pending {
            thread::sleep(WATCH_PERIOD);
        }
    }
}

/// Pool of plain TCP sessions, greedy refill.
pub type TcpPool = ConnectionPool<TcpSession, Greedy>;
/// Pool of plain TCP sessions with conservative backoff refill.
pub type TcpConservativePool = ConnectionPool<TcpSession, ConservativeBackoff>;
/// Pool of UDP sessions, greedy refill.
pub type UdpPool = ConnectionPool<UdpSession, Greedy>;
/// Pool of UDP sessions with conservative backoff refill.
pub type UdpConservativePool = ConnectionPool<UdpSession, ConservativeBackoff>;
/// Pool of TLS sessions, greedy refill.
pub type TlsPool = ConnectionPool<TlsSession, Greedy>;
/// Pool of TLS sessions with conservative backoff refill.
pub type TlsConservativePool = ConnectionPool<TlsSession, ConservativeBackoff>;
/// Pool of HTTP sessions, greedy refill.
pub type HttpPool = ConnectionPool<HttpSession, Greedy>;
/// Pool of HTTP sessions with conservative backoff refill.
pub type HttpConservativePool = ConnectionPool<HttpSession, ConservativeBackoff>;
/// Pool of HTTPS sessions, greedy refill.
pub type HttpsPool = ConnectionPool<HttpsSession, Greedy>;
/// Pool of HTTPS sessions with conservative backoff refill.
pub type HttpsConservativePool = ConnectionPool<HttpsSession, ConservativeBackoff>;
