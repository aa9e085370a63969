use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::financials::FinancialStatement;
use super::quote::Quote;

/// Which dataset a batch run should fetch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum DataKind {
    /// Latest quotes (short TTL)
    #[default]
    Quote,
    /// Financial statements (long TTL)
    Financials,
}

impl DataKind {
    /// Cache key namespace for this kind.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Financials => "financials",
        }
    }
}

/// Either of the two datasets a source can provide.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketData {
    Quote(Quote),
    Financials(FinancialStatement),
}

impl MarketData {
    /// Symbol this value belongs to.
    pub fn symbol(&self) -> &str {
        match self {
            Self::Quote(q) => &q.symbol,
            Self::Financials(f) => &f.symbol,
        }
    }

    pub fn as_quote(&self) -> Option<&Quote> {
        match self {
            Self::Quote(q) => Some(q),
            Self::Financials(_) => None,
        }
    }

    pub fn as_financials(&self) -> Option<&FinancialStatement> {
        match self {
            Self::Quote(_) => None,
            Self::Financials(f) => Some(f),
        }
    }
}

/// Request for a multi-symbol fetch.
#[derive(Clone, Debug)]
pub struct BatchRequest {
    /// Symbols to fetch. Duplicates are ignored (first occurrence wins).
    pub symbols: Vec<String>,
    /// Dataset to fetch for every symbol.
    pub kind: DataKind,
    /// Consult the per-symbol and batch-level caches before fetching.
    pub use_cache: bool,
    /// Maximum number of in-flight fetches (chunk size).
    pub max_concurrency: usize,
    /// Retry budget per symbol on top of the first attempt.
    pub per_item_retries: u32,
}

impl BatchRequest {
    /// Build a quote request with the default concurrency/retry knobs.
    pub fn quotes(symbols: Vec<String>) -> Self {
        Self {
            symbols,
            kind: DataKind::Quote,
            use_cache: true,
            max_concurrency: 5,
            per_item_retries: 2,
        }
    }

    /// Build a financials request with the default knobs.
    pub fn financials(symbols: Vec<String>) -> Self {
        Self {
            kind: DataKind::Financials,
            ..Self::quotes(symbols)
        }
    }

    /// Bypass caches (used by the scheduler's forced refresh).
    pub fn forced(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Aggregate counters for a finished batch run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Distinct symbols requested
    pub total: usize,
    /// Symbols that produced a value
    pub succeeded: usize,
    /// Symbols that produced no value
    pub failed: usize,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
    /// Successes served from cache (no source invoked)
    pub from_cache: usize,
    /// Successes fetched from a source
    pub from_api: usize,
}

/// Outcome of a multi-symbol fetch.
///
/// A pure value owned by the caller; the orchestrator holds no state
/// beyond the shared caches between calls. Invariant:
/// `succeeded.len() + failed.len() == summary.total` and every
/// requested symbol appears in exactly one of the two.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchResult {
    /// Per-symbol values for everything that succeeded
    pub succeeded: HashMap<String, MarketData>,
    /// Symbols that exhausted their retries or had no data anywhere
    pub failed: Vec<String>,
    /// Run counters
    pub summary: BatchSummary,
}

impl BatchResult {
    /// A result where every requested symbol failed, used when the
    /// fault breaker short-circuits a run.
    pub fn all_failed(symbols: Vec<String>, duration_ms: u64) -> Self {
        let total = symbols.len();
        Self {
            succeeded: HashMap::new(),
            failed: symbols,
            summary: BatchSummary {
                total,
                succeeded: 0,
                failed: total,
                duration_ms,
                from_cache: 0,
                from_api: 0,
            },
        }
    }
}
