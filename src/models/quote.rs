use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time price/volume observation for a symbol.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Quote {
    /// Ticker symbol
    pub symbol: String,

    /// Last traded price (must be positive to be considered valid)
    pub price: Decimal,

    /// Change against the previous close, in percent
    pub change_percent: Decimal,

    /// Trading volume
    pub volume: u64,

    /// Observation timestamp reported by the source
    pub as_of: DateTime<Utc>,

    /// Source the quote came from (for logging/diagnostics)
    pub source: String,
}

impl Quote {
    /// Create a new quote.
    pub fn new(
        symbol: impl Into<String>,
        price: Decimal,
        change_percent: Decimal,
        volume: u64,
        as_of: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change_percent,
            volume,
            as_of,
            source: source.into(),
        }
    }

    /// Sanity predicate: a quote is usable iff its price is positive.
    pub fn is_valid(&self) -> bool {
        self.price > Decimal::ZERO
    }
}
