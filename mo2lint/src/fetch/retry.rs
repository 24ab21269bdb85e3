//! Retry policy for resource downloads.

use std::time::Duration;

/// Default number of download attempts per resource.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Delay curve applied between download attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Retry immediately.
    #[default]
    None,
    /// Wait the same amount before every retry.
    Fixed(Duration),
    /// Double the delay after every failed attempt, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

/// How many times a download is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never below 1.
    pub max_attempts: u32,
    /// Delay curve between attempts.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_ATTEMPTS,
            backoff: Backoff::None,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and no backoff.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::None,
        }
    }

    /// Set the backoff curve.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay to wait after `failed_attempts` consecutive failures.
    ///
    /// Returns zero for the first attempt.
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        if failed_attempts == 0 {
            return Duration::ZERO;
        }
        match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let shift = (failed_attempts - 1).min(16);
                base.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}
