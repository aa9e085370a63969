//! Source trait definitions.
//!
//! This module defines the [`MarketSource`] contract implemented by each
//! external provider (scraper or API client) and the tagged
//! [`SourceOutcome`] the fallback chain pattern-matches on.

use async_trait::async_trait;

use crate::errors::AggregatorError;
use crate::models::{FinancialStatement, Quote};

/// Trait for external market data sources.
///
/// Implement this trait to plug a new provider into the fallback chain.
/// Transport and parsing stay behind the implementation; the aggregator
/// only sees the three-operation contract below.
///
/// Implementations are constructed once and reused for the process
/// lifetime - no per-request allocation.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use quotehub::source::MarketSource;
///
/// struct ScreenerSource {
///     client: reqwest::Client,
/// }
///
/// #[async_trait]
/// impl MarketSource for ScreenerSource {
///     fn id(&self) -> &'static str {
///         "SCREENER"
///     }
///
///     // ... implement probe/get_quote/get_financials
/// }
/// ```
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Unique identifier for this source.
    ///
    /// Should be a constant string like "SCREENER", "EXCHANGE_API", etc.
    /// Used for logging and health reporting.
    fn id(&self) -> &'static str;

    /// Source priority for ordering.
    ///
    /// Lower values = higher priority. Default is 10. The fallback chain
    /// fixes this order at construction; no randomization, no best-of-N.
    fn priority(&self) -> u8 {
        10
    }

    /// Cheap liveness check, tried before the expensive real fetch.
    ///
    /// Must never error: implementations map any failure (including a
    /// short ~5s timeout) to `false`. A `false` skips this source for
    /// the current call without penalty.
    async fn probe(&self) -> bool;

    /// Fetch the latest quote for a symbol.
    ///
    /// `Ok(None)` means "this source has no data for the symbol" - a
    /// valid outcome, never an error. `Err` signals a transient failure
    /// the chain may skip past.
    async fn get_quote(&self, symbol: &str) -> Result<Option<Quote>, AggregatorError>;

    /// Fetch the latest financial statement for a symbol.
    ///
    /// Same `Ok(None)` / `Err` convention as [`get_quote`](Self::get_quote).
    async fn get_financials(
        &self,
        symbol: &str,
    ) -> Result<Option<FinancialStatement>, AggregatorError>;
}

/// Tagged outcome of a single source call.
///
/// Replaces the implicit null-vs-throw convention: the aggregator
/// pattern-matches on the tag instead of relying on error unwinding.
/// `NotFound` and `Transient` are handled identically (skip to the next
/// source) but logged at different severities.
#[derive(Debug)]
pub enum SourceOutcome<T> {
    /// The source produced a value (not yet validated).
    Found(T),
    /// The source has no data for this symbol.
    NotFound,
    /// The source failed transiently.
    Transient(AggregatorError),
}

impl<T> From<Result<Option<T>, AggregatorError>> for SourceOutcome<T> {
    fn from(result: Result<Option<T>, AggregatorError>) -> Self {
        match result {
            Ok(Some(value)) => Self::Found(value),
            Ok(None) => Self::NotFound,
            Err(error) => Self::Transient(error),
        }
    }
}
