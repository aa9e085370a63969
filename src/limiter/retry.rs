//! Retry executor with exponential backoff.
//!
//! Every attempt first awaits a slot from the shared [`PacingLimiter`],
//! so retries stay subject to global pacing. Backoff delays follow
//! `min(base_delay * 2^attempt, max_delay)` and are therefore
//! non-decreasing until the cap.

use std::future::Future;
use std::sync::Arc;

use log::{debug, warn};

use crate::config::RetryPolicy;
use crate::errors::AggregatorError;

use super::rate_limiter::PacingLimiter;

/// Runs operations through the shared limiter with bounded retries.
#[derive(Clone)]
pub struct RetryExecutor {
    limiter: Arc<PacingLimiter>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(limiter: Arc<PacingLimiter>, policy: RetryPolicy) -> Self {
        Self { limiter, policy }
    }

    /// The policy this executor runs under.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op`, retrying transient failures per the default condition
    /// (rate limits, timeouts and upstream errors - the 429/5xx
    /// convention).
    ///
    /// Total attempts never exceed `max_retries + 1`.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, AggregatorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AggregatorError>>,
    {
        self.execute_if(op, |e| e.is_retryable()).await
    }

    /// Run `op`, retrying failures matched by `retry_condition`.
    pub async fn execute_if<T, F, Fut, C>(
        &self,
        mut op: F,
        retry_condition: C,
    ) -> Result<T, AggregatorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AggregatorError>>,
        C: Fn(&AggregatorError) -> bool,
    {
        let mut attempt: u32 = 0;
        loop {
            self.limiter.acquire().await;

            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.policy.max_retries || !retry_condition(&error) {
                        return Err(error);
                    }

                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "Retry executor: attempt {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    debug!("Retry executor: starting attempt {}", attempt + 1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PacingConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn unpaced_executor(policy: RetryPolicy) -> RetryExecutor {
        let limiter = Arc::new(PacingLimiter::with_config(PacingConfig {
            min_interval: Duration::ZERO,
            max_per_window: u32::MAX,
            window: Duration::from_secs(60),
        }));
        RetryExecutor::new(limiter, policy)
    }

    fn policy(max_retries: u32, base_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let executor = unpaced_executor(policy(3, 10, 100));
        let calls = AtomicUsize::new(0);

        let result = executor
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AggregatorError>(42)
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_twice_then_succeeds() {
        let executor = unpaced_executor(policy(2, 1000, 30_000));
        let calls = Arc::new(AtomicUsize::new(0));

        let start = Instant::now();
        let calls_in = calls.clone();
        let result = executor
            .execute(move || {
                let calls = calls_in.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(AggregatorError::Timeout {
                            source_id: "TEST".to_string(),
                        })
                    } else {
                        Ok("quote")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "quote");
        // Exactly 3 invocations, with backoff sleeps of 1000ms then 2000ms.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_non_retryable_error_propagates_immediately() {
        let executor = unpaced_executor(policy(5, 1, 10));
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = executor
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AggregatorError::ValidationFailed {
                    symbol: "AAPL".to_string(),
                    message: "bad price".to_string(),
                })
            })
            .await;

        assert!(matches!(
            result,
            Err(AggregatorError::ValidationFailed { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_propagates_last_error() {
        let executor = unpaced_executor(policy(2, 1, 10));
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = executor
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AggregatorError::RateLimited {
                    source_id: "TEST".to_string(),
                })
            })
            .await;

        assert!(matches!(result, Err(AggregatorError::RateLimited { .. })));
        // max_retries + 1 total attempts.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_custom_condition_retries_no_data() {
        let executor = unpaced_executor(policy(1, 0, 0));
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_in = calls.clone();
        let result = executor
            .execute_if(
                move || {
                    let calls = calls_in.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(AggregatorError::NoData {
                                symbol: "AAPL".to_string(),
                            })
                        } else {
                            Ok(7)
                        }
                    }
                },
                |e| matches!(e, AggregatorError::NoData { .. }) || e.is_retryable(),
            )
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let p = policy(5, 1000, 3000);
        assert_eq!(p.delay_for(0), Duration::from_millis(1000));
        assert_eq!(p.delay_for(1), Duration::from_millis(2000));
        assert_eq!(p.delay_for(2), Duration::from_millis(3000));
        assert_eq!(p.delay_for(3), Duration::from_millis(3000));
    }
}
