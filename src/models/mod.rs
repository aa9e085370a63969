//! Data model: quotes, financial statements, batch requests/results and
//! the events published while a batch runs.

mod batch;
mod events;
mod financials;
mod quote;

pub use batch::{BatchRequest, BatchResult, BatchSummary, DataKind, MarketData};
pub use events::{ProgressEvent, ProgressKind, SchedulerEvent};
pub use financials::FinancialStatement;
pub use quote::Quote;
