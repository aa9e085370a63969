//! Outgoing call pacing and retry execution.
//!
//! One [`PacingLimiter`] is shared process-wide across all sources;
//! [`RetryExecutor`] layers bounded exponential-backoff retries on top.

mod rate_limiter;
mod retry;

pub use rate_limiter::PacingLimiter;
pub use retry::RetryExecutor;
