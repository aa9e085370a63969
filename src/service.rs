//! Top-level service facade.
//!
//! Wires the cache, limiter, aggregator, orchestrator and scheduler
//! together once and exposes the whole stack behind a small API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::broadcast;

use crate::aggregator::FallbackAggregator;
use crate::batch::{BatchOrchestrator, CircuitState};
use crate::cache::{CacheStats, TtlCache};
use crate::config::AggregatorConfig;
use crate::limiter::PacingLimiter;
use crate::models::{
    BatchRequest, BatchResult, FinancialStatement, MarketData, ProgressEvent, Quote,
    SchedulerEvent,
};
use crate::scheduler::AutoRefreshScheduler;
use crate::source::MarketSource;

/// Entry point for market data access.
///
/// Construct once with the sources and configuration; every method is
/// `&self` and the service is `Send + Sync`, so it can be shared behind
/// an `Arc` across tasks.
pub struct MarketDataService {
    cache: Arc<TtlCache<MarketData>>,
    aggregator: Arc<FallbackAggregator>,
    orchestrator: Arc<BatchOrchestrator>,
    scheduler: AutoRefreshScheduler,
    refresh_interval: Duration,
}

impl MarketDataService {
    /// Build the full stack over the given sources.
    pub fn new(sources: Vec<Arc<dyn MarketSource>>, config: AggregatorConfig) -> Self {
        let cache = Arc::new(TtlCache::new());
        let limiter = Arc::new(PacingLimiter::with_config(config.pacing.clone()));

        let aggregator = Arc::new(FallbackAggregator::new(
            sources,
            cache.clone(),
            limiter.clone(),
            &config,
        ));
        let orchestrator = Arc::new(BatchOrchestrator::new(
            aggregator.clone(),
            cache.clone(),
            limiter,
            &config,
        ));
        let scheduler =
            AutoRefreshScheduler::new(orchestrator.clone(), config.watch_list.clone());

        info!(
            "Market data service ready with sources: {:?}",
            aggregator.source_ids()
        );

        Self {
            cache,
            aggregator,
            orchestrator,
            scheduler,
            refresh_interval: config.refresh_interval,
        }
    }

    /// Latest quote for one symbol, cache-first over the fallback chain.
    pub async fn get_quote(&self, symbol: &str) -> Option<Quote> {
        self.aggregator.get_quote(symbol).await
    }

    /// Latest financial statement for one symbol.
    pub async fn get_financials(&self, symbol: &str) -> Option<FinancialStatement> {
        self.aggregator.get_financials(symbol).await
    }

    /// Multi-symbol fetch with chunked concurrency and per-item retries.
    pub async fn get_bulk_data(&self, request: BatchRequest) -> BatchResult {
        self.orchestrator.get_bulk_data(request).await
    }

    /// Convenience wrapper: bulk quotes with the default knobs.
    pub async fn get_bulk_quotes(&self, symbols: Vec<String>) -> BatchResult {
        self.get_bulk_data(BatchRequest::quotes(symbols)).await
    }

    /// Probe every source concurrently and report `id -> alive`.
    pub async fn sources_health(&self) -> HashMap<String, bool> {
        self.aggregator.sources_health().await
    }

    /// Registered source ids in priority order.
    pub fn source_ids(&self) -> Vec<&'static str> {
        self.aggregator.source_ids()
    }

    /// Drop every cached value, per-symbol and batch-level alike.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.orchestrator.clear_batch_cache();
        info!("Market data cache cleared");
    }

    /// Drop per-symbol and batch-level entries whose key contains
    /// `pattern`; returns the total number of entries removed. Batch
    /// keys embed the uppercased symbols, so a symbol works as a
    /// pattern against both caches.
    pub fn invalidate_cache(&self, pattern: &str) -> usize {
        self.cache.invalidate(pattern) + self.orchestrator.invalidate_batch_cache(pattern)
    }

    /// Current per-symbol cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Current fault breaker state of the batch machinery.
    pub fn breaker_state(&self) -> CircuitState {
        self.orchestrator.breaker_state()
    }

    /// Start background refresh of the watch list at the configured
    /// interval. Idempotent.
    pub fn start_auto_update(&self) {
        self.scheduler.start(self.refresh_interval);
    }

    /// Start background refresh at a custom interval. Idempotent.
    pub fn start_auto_update_every(&self, interval: Duration) {
        self.scheduler.start(interval);
    }

    /// Stop background refresh. Idempotent.
    pub fn stop_auto_update(&self) {
        self.scheduler.stop();
    }

    /// Whether the background refresh loop is running.
    pub fn is_auto_updating(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Subscribe to per-item batch progress events.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.orchestrator.subscribe()
    }

    /// Subscribe to auto-refresh outcome events.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.scheduler.subscribe()
    }
}
