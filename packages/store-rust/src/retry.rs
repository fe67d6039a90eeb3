//! Retry executor driving the pure backoff policy on tokio time.
//!
//! [`BackoffPolicy`](remora_core::BackoffPolicy) decides *whether and when*
//! to retry; this module does the sleeping and the bookkeeping. The
//! cancellable variant takes a predicate checked before every scheduled
//! retry — that is how a closed iterator halts an in-flight scan instead of
//! retrying forever against a consumer that has walked away.

use std::future::Future;

use remora_core::{BackoffPolicy, RetryDecision};
use tokio::time::Instant;

use crate::error::StoreError;

/// Diagnostics hook for retry attempts.
///
/// Called once per scheduled retry and once if attempts are exhausted.
pub trait RetryObserver: Send + Sync {
    /// A retry is about to be scheduled after the `attempt`-th failure.
    fn on_retry(&self, attempt: u32, error: &anyhow::Error);

    /// Attempts are exhausted; the failure is terminal.
    fn on_give_up(&self, attempts: u32, error: &anyhow::Error);
}

/// Default observer: `tracing` warnings plus `metrics` counters.
#[derive(Debug, Clone, Copy)]
pub struct LoggingRetryObserver {
    /// Operation label used in logs and metric tags.
    pub operation: &'static str,
}

impl RetryObserver for LoggingRetryObserver {
    fn on_retry(&self, attempt: u32, error: &anyhow::Error) {
        tracing::warn!(operation = self.operation, attempt, %error, "retrying remote operation");
        metrics::counter!("remora_retry_attempts_total", "operation" => self.operation)
            .increment(1);
    }

    fn on_give_up(&self, attempts: u32, error: &anyhow::Error) {
        tracing::error!(operation = self.operation, attempts, %error, "retries exhausted");
        metrics::counter!("remora_retries_exhausted_total", "operation" => self.operation)
            .increment(1);
    }
}

/// Outcome of a cancellable retried operation.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// The operation eventually succeeded.
    Done(T),
    /// The cancellation predicate fired; the operation was abandoned
    /// quietly, with no terminal failure reported.
    Cancelled,
}

/// Runs `op` under the policy until it succeeds, the policy gives up, or
/// `cancelled` returns true.
///
/// The predicate is checked before scheduling each retry and again after
/// the backoff sleep, so cancellation takes effect within one decision
/// cycle. A request already in flight is not interrupted.
///
/// # Errors
///
/// Returns [`StoreError::RetriesExhausted`] when the policy gives up.
pub async fn retry_cancellable<T, F, Fut, C>(
    policy: &BackoffPolicy,
    observer: &dyn RetryObserver,
    cancelled: C,
    mut op: F,
) -> Result<RetryOutcome<T>, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
    C: Fn() -> bool,
{
    let started = Instant::now();
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(RetryOutcome::Done(value)),
            Err(error) => {
                if cancelled() {
                    return Ok(RetryOutcome::Cancelled);
                }
                match policy.decide(attempt, started.elapsed()) {
                    RetryDecision::GiveUp => {
                        observer.on_give_up(attempt, &error);
                        return Err(StoreError::RetriesExhausted {
                            attempts: attempt,
                            source: error,
                        });
                    }
                    RetryDecision::RetryAfter(delay) => {
                        observer.on_retry(attempt, &error);
                        tokio::time::sleep(delay).await;
                        if cancelled() {
                            return Ok(RetryOutcome::Cancelled);
                        }
                        attempt += 1;
                    }
                }
            }
        }
    }
}

/// Runs `op` under the policy until it succeeds or the policy gives up.
///
/// Non-cancellable variant used by point operations.
///
/// # Errors
///
/// Returns [`StoreError::RetriesExhausted`] when the policy gives up.
pub async fn retry<T, F, Fut>(
    policy: &BackoffPolicy,
    observer: &dyn RetryObserver,
    op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    match retry_cancellable(policy, observer, || false, op).await? {
        RetryOutcome::Done(value) => Ok(value),
        RetryOutcome::Cancelled => unreachable!("cancellation predicate is constant false"),
    }
}
