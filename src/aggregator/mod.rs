//! Fallback aggregation over prioritized sources.
//!
//! This module provides:
//! - [`FallbackAggregator`]: cache-first, first-success-wins chain
//! - [`QuoteValidator`]: sanity and plausibility validation

mod fallback;
mod validator;

pub use fallback::FallbackAggregator;
pub use validator::{QuoteValidator, ValidatorConfig};
