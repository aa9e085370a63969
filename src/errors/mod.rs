//! Error types and retry classification.
//!
//! This module provides:
//! - [`AggregatorError`]: The main error enum for all aggregation operations
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Errors that can occur during aggregation operations.
///
/// Each variant is classified into a [`RetryClass`] via the
/// [`retry_class`](Self::retry_class) method, which determines how the
/// retry executor and the fallback chain handle the error.
///
/// Per-symbol errors never cross the batch-item boundary: the public
/// batch API converts them into `failed` entries instead of raising.
#[derive(Error, Debug)]
pub enum AggregatorError {
    /// A source's liveness probe failed.
    /// The source is skipped for this call, not fatal.
    #[error("Source unavailable: {source_id}")]
    SourceUnavailable {
        /// Id of the source whose probe failed
        source_id: String,
    },

    /// A source threw during a fetch.
    /// Logged and skipped; the next source in priority order is tried.
    #[error("Source call failed: {source_id} - {message}")]
    SourceCallFailed {
        /// Id of the source that returned the error
        source_id: String,
        /// The error message from the source
        message: String,
    },

    /// The source rate limited the request (HTTP 429 analogue).
    /// Should retry with exponential backoff.
    #[error("Rate limited: {source_id}")]
    RateLimited {
        /// Id of the source that rate limited the request
        source_id: String,
    },

    /// The request to the source timed out.
    /// Treated identically to any other transient failure.
    #[error("Timeout: {source_id}")]
    Timeout {
        /// Id of the source that timed out
        source_id: String,
    },

    /// The source's upstream returned a server error (5xx analogue).
    /// Should retry with exponential backoff.
    #[error("Upstream error: {source_id} - status {status}")]
    Upstream {
        /// Id of the source reporting the upstream failure
        source_id: String,
        /// Upstream status code
        status: u16,
    },

    /// Every source was exhausted without producing data.
    /// A valid empty result for single-symbol calls; batch items record
    /// the symbol in `failed`.
    #[error("No data found for symbol: {symbol}")]
    NoData {
        /// The symbol that produced no data
        symbol: String,
    },

    /// A result was present but failed the sanity predicate.
    /// Treated like a failed source call: skip to the next source.
    #[error("Validation failed for {symbol}: {message}")]
    ValidationFailed {
        /// The symbol whose data failed validation
        symbol: String,
        /// Description of the validation failure
        message: String,
    },

    /// Per-item retries were exhausted during a batch run.
    /// Recorded in the batch's `failed` list; the batch continues.
    #[error("Batch item exhausted after {attempts} attempts: {symbol}")]
    BatchItemExhausted {
        /// The symbol that kept failing
        symbol: String,
        /// Total attempts made
        attempts: u32,
    },

    /// The outer fault breaker is open; batch runs are short-circuited
    /// for the cooldown window.
    #[error("Fault breaker open")]
    BreakerOpen,

    /// Unexpected failure in the batch machinery itself (never a
    /// per-item failure). Counted by the fault breaker.
    #[error("Orchestration fault: {message}")]
    OrchestrationFault {
        /// Description of the machinery failure
        message: String,
    },
}

impl AggregatorError {
    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::Never`]: terminal, don't retry
    /// - [`RetryClass::Backoff`]: retry in place with exponential backoff
    /// - [`RetryClass::NextSource`]: skip to the next source in the chain
    ///
    /// # Examples
    ///
    /// ```
    /// use quotehub::errors::{AggregatorError, RetryClass};
    ///
    /// let error = AggregatorError::RateLimited { source_id: "SCREENER".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::Backoff);
    ///
    /// let error = AggregatorError::ValidationFailed {
    ///     symbol: "AAPL".to_string(),
    ///     message: "non-positive price".to_string(),
    /// };
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Transient errors - retry with backoff
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::Upstream { .. } => {
                RetryClass::Backoff
            }

            // Source-specific failures - try the next source
            Self::SourceUnavailable { .. } | Self::SourceCallFailed { .. } => {
                RetryClass::NextSource
            }

            // Terminal outcomes
            Self::NoData { .. }
            | Self::ValidationFailed { .. }
            | Self::BatchItemExhausted { .. }
            | Self::BreakerOpen
            | Self::OrchestrationFault { .. } => RetryClass::Never,
        }
    }

    /// Whether the executor's default retry condition matches this error.
    ///
    /// Matches the HTTP 429 / 5xx convention: rate limits, timeouts and
    /// upstream errors are retryable, everything else is not.
    pub fn is_retryable(&self) -> bool {
        self.retry_class() == RetryClass::Backoff
    }
}
