//! Bounded retry for throttled read-only calls.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{ReconcileError, Result, StaxError};

/// Default delay before the first retry in milliseconds.
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Default maximum number of attempts, including the first.
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Exponential backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before the given retry (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << retry.saturating_sub(1).min(16))
    }
}

/// Runs `call` until it succeeds, fails with a non-retryable error, or the
/// attempt limit is reached.
///
/// # Errors
///
/// Returns the first non-retryable error, or `ReconcileError::MaxRetriesExceeded`.
pub async fn retry_throttled<T, F, Fut>(policy: RetryPolicy, operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            let delay = policy.delay_for(attempt - 1);
            debug!("Retry attempt {attempt} of {} for {operation} in {delay:?}", policy.max_attempts);
            tokio::time::sleep(delay).await;
        }

        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                debug!("{operation} throttled: {e}");
            }
            Err(e) => return Err(e),
        }
    }

    Err(StaxError::Reconcile(ReconcileError::MaxRetriesExceeded {
        attempts: policy.max_attempts,
        resource: operation.to_string(),
    }))
}
