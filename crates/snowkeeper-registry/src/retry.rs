use crate::error::{AllocationError, CoordinationError};
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use typed_builder::TypedBuilder;

/// Bounded exponential backoff for coordination calls made during startup.
///
/// The delay before retry `n` (1-based) is `base_delay * 2^(n-1)`, capped at
/// `max_delay`. Only retryable errors are retried; see
/// [`CoordinationError::is_retryable`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct RetryPolicy {
    #[builder(default = Duration::from_millis(1000))]
    pub base_delay: Duration,
    #[builder(default = Duration::from_secs(8))]
    pub max_delay: Duration,
    #[builder(default = 3)]
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// No retries at all; the first transient failure is reported.
    pub fn none() -> Self {
        Self::builder().max_retries(0).build()
    }

    /// Delay before the given retry (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1_u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or
    /// the retry budget is spent.
    ///
    /// Exhausting the budget yields
    /// [`AllocationError::CoordinationUnavailable`]; non-retryable errors are
    /// passed through as [`AllocationError::Coordination`].
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, AllocationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoordinationError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(AllocationError::Coordination(e)),
                Err(e) if attempts > self.max_retries => {
                    return Err(AllocationError::CoordinationUnavailable {
                        operation,
                        attempts,
                        source: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempts);
                    warn!(operation, attempts, ?delay, error = %e, "coordination call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
