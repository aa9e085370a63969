//! Fetched-data validation.
//!
//! Validates source results before they are cached and returned:
//! - sanity predicates (positive price, positive total assets)
//! - plausibility bound against the last cached price, replacing any
//!   per-symbol numeric corrections a source might otherwise need

use log::warn;
use rust_decimal::Decimal;

use crate::errors::AggregatorError;
use crate::models::{FinancialStatement, Quote};

/// Validator configuration.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Reject quotes whose price deviates more than this many percent
    /// from the previous cached price for the same symbol. `None`
    /// disables the plausibility bound.
    pub max_deviation_pct: Option<Decimal>,
    /// Upper sanity bound on any price.
    pub max_price: Option<Decimal>,
    /// Log a warning on zero volume (market may be closed).
    pub warn_on_zero_volume: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_deviation_pct: Some(Decimal::from(50)),
            max_price: Some(Decimal::from(1_000_000_000i64)),
            warn_on_zero_volume: true,
        }
    }
}

/// Validates quotes and financial statements from sources.
///
/// Hard failures reject the value and send the fallback chain to the
/// next source; soft issues are logged and the value is accepted.
pub struct QuoteValidator {
    config: ValidatorConfig,
}

impl QuoteValidator {
    pub fn new() -> Self {
        Self {
            config: ValidatorConfig::default(),
        }
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate a quote against its sanity predicate and, when a
    /// previous price is known, the plausibility bound.
    pub fn validate_quote(
        &self,
        quote: &Quote,
        previous_price: Option<Decimal>,
    ) -> Result<(), AggregatorError> {
        if !quote.is_valid() {
            return Err(AggregatorError::ValidationFailed {
                symbol: quote.symbol.clone(),
                message: format!("non-positive price: {}", quote.price),
            });
        }

        if let Some(max_price) = self.config.max_price {
            if quote.price > max_price {
                return Err(AggregatorError::ValidationFailed {
                    symbol: quote.symbol.clone(),
                    message: format!("price {} exceeds sanity limit {}", quote.price, max_price),
                });
            }
        }

        if let (Some(bound), Some(previous)) = (self.config.max_deviation_pct, previous_price) {
            if previous > Decimal::ZERO {
                let deviation = ((quote.price - previous).abs() / previous) * Decimal::from(100);
                if deviation > bound {
                    return Err(AggregatorError::ValidationFailed {
                        symbol: quote.symbol.clone(),
                        message: format!(
                            "price {} deviates {:.1}% from last cached {} (bound {}%)",
                            quote.price, deviation, previous, bound
                        ),
                    });
                }
            }
        }

        if self.config.warn_on_zero_volume && quote.volume == 0 {
            warn!(
                "Quote validation warning for {}: zero volume (market may be closed)",
                quote.symbol
            );
        }

        Ok(())
    }

    /// Validate a financial statement against its sanity predicate.
    pub fn validate_financials(
        &self,
        statement: &FinancialStatement,
    ) -> Result<(), AggregatorError> {
        if !statement.is_valid() {
            return Err(AggregatorError::ValidationFailed {
                symbol: statement.symbol.clone(),
                message: format!("non-positive total assets: {}", statement.total_assets),
            });
        }
        Ok(())
    }
}

impl Default for QuoteValidator {
    fn default() -> Self {
        Self::new()
    }
}
