//! Refill policies for the pool watcher.
//!
//! [`Greedy`] reconnects every vacancy at once and is right while the backend
//! is healthy; [`ConservativeBackoff`] throttles attempts with jittered
//! exponential cool-downs so a failing backend is not met with a thundering
//! herd.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::connector::Connector;
use crate::log_debug;
use crate::stream::Connect;

/// Fills pool vacancies on behalf of the watcher.
///
/// `refill` is called with the number of vacant slots and an `append`
/// callback that deposits one freshly connected session into the pool. The
/// return value tells the watcher whether more work is pending: `true` skips
/// the inter-cycle sleep.
pub trait RefillStrategy<C: Connect>: Send + 'static {
    fn refill(&mut self, connector: &Connector<C>, vacant: usize, append: &(dyn Fn(C) + Sync))
        -> bool;
}

/// Reconnect every vacancy in parallel, one worker thread per slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct Greedy;

impl<C: Connect> RefillStrategy<C> for Greedy {
    fn refill(
        &mut self,
        connector: &Connector<C>,
        vacant: usize,
        append: &(dyn Fn(C) + Sync),
    ) -> bool {
        thread::scope(|scope| {
            for _ in 0..vacant {
                scope.spawn(|| match connector.new_session_default() {
                    Ok(session) => append(session),
                    Err(err) => log_debug!("refill attempt failed: {err}"),
                });
            }
        });
        vacant > 0
    }
}

/// Exponential backoff with uniform jitter.
///
/// While healthy (no active backoff) a refill call makes one in-thread
/// attempt plus up to `⌊(vacant + 2) / 3⌋ − 1` parallel ones. After a fully
/// failed call the next delay is `previous × multiplier × uniform(0, 1)`
/// (starting from `initial_delay`), clamped to `max_delay`, and no attempts
/// happen until it elapses. During backoff each call makes exactly one
/// attempt. Any success resets the delay.
#[derive(Debug)]
pub struct ConservativeBackoff {
    initial_delay: Duration,
    multiplier: u32,
    max_delay: Duration,
    current_delay: Duration,
    wait_until: Instant,
    rng: StdRng,
}

impl ConservativeBackoff {
    pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(50);
    pub const DEFAULT_MULTIPLIER: u32 = 3;
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

    pub fn new() -> Self {
        Self::with_parameters(
            Self::DEFAULT_INITIAL_DELAY,
            Self::DEFAULT_MULTIPLIER,
            Self::DEFAULT_MAX_DELAY,
        )
    }

    /// `multiplier` below 1 is clamped to 1.
    pub fn with_parameters(initial_delay: Duration, multiplier: u32, max_delay: Duration) -> Self {
        ConservativeBackoff {
            initial_delay,
            multiplier: multiplier.max(1),
            max_delay,
            current_delay: Duration::ZERO,
            wait_until: Instant::now(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Remaining cool-down, zero when attempts are currently allowed.
    pub fn cooldown_remaining(&self) -> Duration {
        self.wait_until.saturating_duration_since(Instant::now())
    }

    fn next_delay(&mut self) -> Duration {
        let base = if self.current_delay.is_zero() {
            self.initial_delay
        } else {
            self.current_delay.saturating_mul(self.multiplier)
        };
        let jitter: f64 = self.rng.gen();
        base.mul_f64(jitter).min(self.max_delay)
    }
}

impl Default for ConservativeBackoff {
    fn default() -> Self {
        ConservativeBackoff::new()
    }
}

impl<C: Connect> RefillStrategy<C> for ConservativeBackoff {
    fn refill(
        &mut self,
        connector: &Connector<C>,
        vacant: usize,
        append: &(dyn Fn(C) + Sync),
    ) -> bool {
        if Instant::now() < self.wait_until {
            return false;
        }

        let extra_workers = if self.current_delay.is_zero() {
            ((vacant + 2) / 3).saturating_sub(1)
        } else {
            // In backoff: exactly one in-thread attempt per call.
            0
        };

        let appended = AtomicUsize::new(0);
        let attempt = |appended: &AtomicUsize| match connector.new_session_default() {
            Ok(session) => {
                append(session);
                appended.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => log_debug!("conservative refill attempt failed: {err}"),
        };

        thread::scope(|scope| {
            for _ in 0..extra_workers {
                scope.spawn(|| attempt(&appended));
            }
            attempt(&appended);
        });

        if appended.load(Ordering::Relaxed) > 0 {
            self.current_delay = Duration::ZERO;
            true
        } else {
            self.current_delay = self.next_delay();
            self.wait_until = Instant::now() + self.current_delay;
            log_debug!(
                "all refill attempts failed, cooling down for {:?}",
                self.current_delay
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_clamped_to_one() {
        let strategy =
            ConservativeBackoff::with_parameters(Duration::from_millis(10), 0, Duration::from_secs(1));
        assert_eq!(strategy.multiplier, 1);
    }

    #[test]
    fn next_delay_starts_from_initial_and_is_clamped() {
        let mut strategy = ConservativeBackoff::with_parameters(
            Duration::from_millis(100),
            3,
            Duration::from_millis(150),
        );
        for _ in 0..32 {
            let delay = strategy.next_delay();
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn next_delay_grows_from_current() {
        let mut strategy = ConservativeBackoff::with_parameters(
            Duration::from_millis(100),
            3,
            Duration::from_secs(10),
        );
        strategy.current_delay = Duration::from_millis(200);
        // multiplier 3 on 200ms, jittered by uniform(0,1): never above 600ms.
        for _ in 0..32 {
            assert!(strategy.next_delay() <= Duration::from_millis(600));
        }
    }

    #[test]
    fn fresh_strategy_has_no_cooldown() {
        let strategy = ConservativeBackoff::new();
        assert_eq!(strategy.cooldown_remaining(), Duration::ZERO);
    }
}
