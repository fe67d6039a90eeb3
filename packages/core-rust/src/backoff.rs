//! Exponential backoff decision logic.
//!
//! [`BackoffPolicy`] is a pure function of failure history to a retry
//! decision: it never sleeps and never looks at a clock. The caller supplies
//! the consecutive-failure count and the time elapsed since the first
//! failure; the policy answers "retry after this delay" or "give up". The
//! store crate's retry executor schedules the actual sleeps on tokio time.

use std::time::Duration;

/// Decision for the next retry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after waiting for the given delay.
    RetryAfter(Duration),
    /// Stop retrying; the failure is terminal.
    GiveUp,
}

/// Exponential backoff with attempt and elapsed-time caps.
///
/// The delay before the n-th retry (1-based) is
/// `min(initial_delay * 2^(n-1), max_delay)`. Retrying stops once the
/// attempt count exceeds `max_attempts` or the elapsed time since the first
/// failure exceeds `max_elapsed`, whichever is reached first.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single retry delay.
    pub max_delay: Duration,
    /// Maximum number of retry attempts before giving up.
    pub max_attempts: u32,
    /// Maximum cumulative time since the first failure before giving up.
    pub max_elapsed: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            max_attempts: 10,
            max_elapsed: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay before the `try_number`-th retry (1-based).
    ///
    /// Saturates at `max_delay`; the shift is clamped so large attempt
    /// numbers cannot overflow the multiplication.
    #[must_use]
    pub fn delay_for(&self, try_number: u32) -> Duration {
        let shift = try_number.saturating_sub(1).min(32);
        let delay = self
            .initial_delay
            .saturating_mul(1_u32.checked_shl(shift).unwrap_or(u32::MAX));
        delay.min(self.max_delay)
    }

    /// Decides whether to retry after the `try_number`-th consecutive
    /// failure (1-based), given the time elapsed since the first failure.
    #[must_use]
    pub fn decide(&self, try_number: u32, elapsed: Duration) -> RetryDecision {
        if try_number > self.max_attempts || elapsed > self.max_elapsed {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(self.delay_for(try_number))
        }
    }
}
