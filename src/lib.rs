//! Quotehub
//!
//! Resilient aggregation of near-real-time quotes and financial
//! statements from several unreliable, rate-limited, independently
//! failing sources. Callers get a single best-effort, freshness-bounded
//! value per symbol without seeing provider outages, rate limits, or
//! inconsistent latencies.
//!
//! # Architecture
//!
//! ```text
//! +------------------+       +------------------+
//! |  MarketDataService| ---> | AutoRefreshScheduler | (timer-driven refresh)
//! +------------------+       +------------------+
//!         |                           |
//!         v                           v
//! +------------------+       +------------------+
//! | FallbackAggregator| <--- | BatchOrchestrator |  (chunked fan-out,
//! +------------------+       +------------------+   progress events)
//!         |                           |
//!         v                           v
//! +------------------+       +------------------+
//! |  MarketSource(s) |       |  TtlCache        |  (shared, in-memory)
//! +------------------+       +------------------+
//!         |
//!         v
//! +------------------+
//! |  PacingLimiter   |  (process-wide pacing + retry backoff)
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`MarketSource`] - capability contract implemented by each external
//!   provider (scraper or API client)
//! - [`FallbackAggregator`] - tries sources in priority order, validates
//!   results, populates the cache
//! - [`BatchOrchestrator`] - bounded-concurrency multi-symbol fetching
//!   with partial-failure semantics and an outer circuit breaker
//! - [`AutoRefreshScheduler`] - periodic background refresh over a
//!   watch list
//! - [`MarketDataService`] - facade wiring all of the above together
//!
//! All caches are in-memory and reset on process restart.

pub mod aggregator;
pub mod batch;
pub mod cache;
pub mod config;
pub mod errors;
pub mod limiter;
pub mod models;
pub mod scheduler;
pub mod service;
pub mod source;

pub use aggregator::{FallbackAggregator, QuoteValidator, ValidatorConfig};
pub use batch::{BatchOrchestrator, CircuitState, FaultBreaker};
pub use cache::{CacheEntry, CacheStats, TtlCache};
pub use config::{AggregatorConfig, BreakerConfig, PacingConfig, RetryPolicy};
pub use errors::{AggregatorError, RetryClass};
pub use limiter::{PacingLimiter, RetryExecutor};
pub use models::{
    BatchRequest, BatchResult, BatchSummary, DataKind, FinancialStatement, MarketData,
    ProgressEvent, ProgressKind, Quote, SchedulerEvent,
};
pub use scheduler::AutoRefreshScheduler;
pub use service::MarketDataService;
pub use source::{MarketSource, SourceOutcome};
