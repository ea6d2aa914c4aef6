//! The shared reactor behind every blocking operation.
//!
//! The crate exposes a purely blocking surface but drives all I/O through one
//! process-wide tokio runtime, started lazily on first use. Each public
//! operation submits a future here and parks the calling thread until the
//! future resolves or its deadline fires; tokio's `timeout_at` is the
//! cancellation mechanism, so an expired deadline simply drops the in-flight
//! future (pending connects, reads and lookups included).

use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::Runtime;

use crate::base::{Deadline, Error, Result};

/// Handle to the lazily-started reactor runtime.
pub(crate) fn reactor() -> &'static Runtime {
    static REACTOR: OnceLock<Runtime> = OnceLock::new();
    REACTOR.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .thread_name("wirepool-reactor")
            .build()
            .expect("wirepool: reactor runtime failed to start")
    })
}

/// Run `future` to completion, bounded by `deadline`.
///
/// The single enforcement point for the deadline contract: an infinite
/// deadline blocks until the future resolves; a finite one races it against
/// the reactor timer. tokio polls the wrapped future once before checking the
/// timer, which gives an already-expired deadline exactly one non-blocking
/// chance to complete.
pub(crate) fn block_on_deadline<T, F>(deadline: Deadline, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline.instant() {
        None => reactor().block_on(future),
        Some(at) => {
            let at = tokio::time::Instant::from_std(at);
            let rt = reactor();
            let _guard = rt.enter();
            match rt.block_on(tokio::time::timeout_at(at, future)) {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout),
            }
        }
    }
}

/// Spawn a background task onto the reactor.
pub(crate) fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    reactor().spawn(future)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn completes_within_deadline() {
        let out = block_on_deadline(Deadline::after(Duration::from_secs(1)), async { Ok(7) });
        assert_eq!(out, Ok(7));
    }

    #[test]
    fn expired_deadline_still_polls_once() {
        // A ready future completes even with a zero budget.
        let out = block_on_deadline(Deadline::after(Duration::ZERO), async { Ok("ready") });
        assert_eq!(out, Ok("ready"));
    }

    #[test]
    fn pending_future_times_out() {
        let out: Result<()> = block_on_deadline(
            Deadline::after(Duration::from_millis(20)),
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            },
        );
        assert_eq!(out, Err(Error::Timeout));
    }

    #[test]
    fn infinite_deadline_blocks_to_completion() {
        let out = block_on_deadline(Deadline::INFINITE, async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(3)
        });
        assert_eq!(out, Ok(3));
    }
}
