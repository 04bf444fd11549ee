//! Exponential backoff with jitter for polling loops.

use std::time::Duration;

use rand::Rng;

/// Retry state for a polling loop.
///
/// Holds the attempt count and hands out the next delay; the caller owns the
/// loop, so stopping early is just dropping the state.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    attempts: u32,
}

impl Backoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            attempts: 0,
        }
    }

    /// Number of attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record an attempt and return how long to wait before the next one.
    ///
    /// The first wait is `base_ms`, each later one doubles, capped at `max_ms`,
    /// plus up to 10% jitter.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.peek_base_delay();
        self.attempts = self.attempts.saturating_add(1);
        with_jitter(base)
    }

    /// The delay the next call to [`Backoff::next_delay`] would use, without jitter.
    pub fn peek_base_delay(&self) -> Duration {
        let factor = 1u64.checked_shl(self.attempts).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(factor).min(self.max_ms))
    }
}

fn with_jitter(base: Duration) -> Duration {
    let spread = base.as_millis() as u64 / 10;
    if spread == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..spread))
}
