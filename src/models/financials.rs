use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balance-sheet snapshot and headline results for a company.
///
/// Figures are reported in the source's native currency; the crate does
/// no conversion. Only `total_assets` participates in the validity
/// predicate - everything else is carried as-is.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FinancialStatement {
    /// Ticker symbol
    pub symbol: String,

    /// Registered company name
    pub company_name: String,

    /// Total assets (must be positive to be considered valid)
    pub total_assets: Decimal,

    /// Total liabilities
    pub total_liabilities: Decimal,

    /// Owner's equity
    pub equity: Decimal,

    /// Net profit for the reported period
    pub net_profit: Decimal,

    /// Revenue for the reported period, when the source exposes it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue: Option<Decimal>,

    /// Reporting period label (e.g. "2025-Q2"), when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,

    /// Source the statement came from
    pub source: String,
}

impl FinancialStatement {
    /// Sanity predicate: a statement is usable iff `total_assets > 0`.
    pub fn is_valid(&self) -> bool {
        self.total_assets > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_statement(total_assets: Decimal) -> FinancialStatement {
        FinancialStatement {
            symbol: "ACME".to_string(),
            company_name: "Acme Corp".to_string(),
            total_assets,
            total_liabilities: dec!(400),
            equity: dec!(600),
            net_profit: dec!(50),
            revenue: Some(dec!(900)),
            period: Some("2025-Q2".to_string()),
            source: "TEST".to_string(),
        }
    }

    #[test]
    fn test_statement_valid() {
        assert!(make_statement(dec!(1000)).is_valid());
    }

    #[test]
    fn test_zero_assets_invalid() {
        assert!(!make_statement(dec!(0)).is_valid());
    }
}
