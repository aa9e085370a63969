//! Configuration for the aggregation stack.
//!
//! Plain config structs with `Default` impls; each component takes its
//! slice by value at construction so multiple isolated instances can
//! coexist (nothing here is global).

use std::time::Duration;

use rust_decimal::Decimal;

/// Default minimum interval between any two outgoing calls.
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(200);

/// Default rolling-window request budget.
const DEFAULT_MAX_PER_WINDOW: u32 = 60;

/// Default rolling window length.
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Default retry budget for a single-symbol fetch.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default first backoff delay.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default backoff cap.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Per-item backoff starts smaller so a batch item doesn't stall its chunk.
const DEFAULT_PER_ITEM_BASE_DELAY: Duration = Duration::from_millis(500);

/// Quote entries go stale quickly.
const DEFAULT_TTL_QUOTE: Duration = Duration::from_secs(30);

/// Financial statements change on reporting cadence, not tick cadence.
const DEFAULT_TTL_FINANCIALS: Duration = Duration::from_secs(6 * 3600);

/// Batch-level results are a coarse optimization over per-symbol entries.
const DEFAULT_TTL_BATCH: Duration = Duration::from_secs(60);

/// Consecutive orchestration faults before the breaker opens.
const DEFAULT_FAULT_THRESHOLD: u32 = 3;

/// How long an open breaker short-circuits batch runs.
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Outer retry budget around a whole batch run.
const DEFAULT_OUTER_RETRIES: u32 = 1;

/// Default auto-refresh interval.
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Pacing constraints for the process-wide limiter.
#[derive(Clone, Debug)]
pub struct PacingConfig {
    /// Minimum time between two granted slots.
    pub min_interval: Duration,
    /// Maximum slots granted inside one rolling window.
    pub max_per_window: u32,
    /// Rolling window length.
    pub window: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            max_per_window: DEFAULT_MAX_PER_WINDOW,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Exponential backoff policy for the retry executor.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Retries on top of the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap applied to the doubled delays.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the retry following `attempt` (0-based):
    /// `min(base_delay * 2^attempt, max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Smaller-delay policy applied per batch item.
    pub fn per_item(retries: u32) -> Self {
        Self {
            max_retries: retries,
            base_delay: DEFAULT_PER_ITEM_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

/// Fault breaker configuration for the batch orchestrator.
#[derive(Clone, Debug)]
pub struct BreakerConfig {
    /// Consecutive faults before the breaker opens.
    pub fault_threshold: u32,
    /// Cooldown before a half-open test run is allowed.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            fault_threshold: DEFAULT_FAULT_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Top-level configuration for the whole aggregation stack.
#[derive(Clone, Debug)]
pub struct AggregatorConfig {
    /// Process-wide pacing constraints.
    pub pacing: PacingConfig,
    /// Retry policy for single-symbol fetches.
    pub retry: RetryPolicy,
    /// Outer fault breaker settings.
    pub breaker: BreakerConfig,
    /// Outer retry budget around a whole batch run.
    pub outer_retries: u32,
    /// Freshness bound for cached quotes.
    pub ttl_quote: Duration,
    /// Freshness bound for cached financial statements.
    pub ttl_financials: Duration,
    /// Freshness bound for cached batch results.
    pub ttl_batch: Duration,
    /// Plausibility bound: reject quotes deviating more than this many
    /// percent from the last cached price for the same symbol.
    pub max_deviation_pct: Decimal,
    /// Symbols the scheduler refreshes in the background.
    pub watch_list: Vec<String>,
    /// Default auto-refresh interval.
    pub refresh_interval: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            pacing: PacingConfig::default(),
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            outer_retries: DEFAULT_OUTER_RETRIES,
            ttl_quote: DEFAULT_TTL_QUOTE,
            ttl_financials: DEFAULT_TTL_FINANCIALS,
            ttl_batch: DEFAULT_TTL_BATCH,
            max_deviation_pct: Decimal::from(50),
            watch_list: Vec::new(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_sequence_non_decreasing() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..10 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous);
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
    }

    #[test]
    fn test_per_item_policy_uses_smaller_base() {
        let policy = RetryPolicy::per_item(2);
        assert_eq!(policy.max_retries, 2);
        assert!(policy.base_delay < RetryPolicy::default().base_delay);
    }

    #[test]
    fn test_large_attempt_does_not_overflow() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), policy.max_delay);
    }
}
