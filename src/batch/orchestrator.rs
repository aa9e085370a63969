//! Multi-symbol batch orchestration.
//!
//! A batch run fans symbols out over the fallback aggregator in
//! sequential chunks of `max_concurrency`, retries each item under the
//! shared pacing limiter and publishes incremental progress events.
//! Item failures are data (the symbol lands in `failed`); only faults
//! of the machinery itself abort a run, feed the fault breaker and
//! consume the outer retry budget.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::aggregator::FallbackAggregator;
use crate::cache::TtlCache;
use crate::config::{AggregatorConfig, RetryPolicy};
use crate::errors::AggregatorError;
use crate::limiter::{PacingLimiter, RetryExecutor};
use crate::models::{
    BatchRequest, BatchResult, BatchSummary, DataKind, MarketData, ProgressEvent,
};

use super::circuit_breaker::{CircuitState, FaultBreaker};

/// Progress subscribers that lag behind lose the oldest events.
const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Runs multi-symbol fetches with bounded concurrency, batch-level
/// caching and an outer fault breaker.
///
/// [`get_bulk_data`](Self::get_bulk_data) never fails: a short-circuited
/// or exhausted run degrades to a result where every symbol failed.
pub struct BatchOrchestrator {
    aggregator: Arc<FallbackAggregator>,
    /// Per-symbol cache, shared with the aggregator.
    cache: Arc<TtlCache<MarketData>>,
    /// Batch-level cache keyed by kind + sorted symbol set.
    batch_cache: TtlCache<BatchResult>,
    limiter: Arc<PacingLimiter>,
    breaker: FaultBreaker,
    progress_tx: broadcast::Sender<ProgressEvent>,
    outer_retries: u32,
    ttl_batch: Duration,
}

impl BatchOrchestrator {
    pub fn new(
        aggregator: Arc<FallbackAggregator>,
        cache: Arc<TtlCache<MarketData>>,
        limiter: Arc<PacingLimiter>,
        config: &AggregatorConfig,
    ) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            aggregator,
            cache,
            batch_cache: TtlCache::new(),
            limiter,
            breaker: FaultBreaker::with_config(config.breaker.clone()),
            progress_tx,
            outer_retries: config.outer_retries,
            ttl_batch: config.ttl_batch,
        }
    }

    /// Subscribe to progress events for all subsequent batch runs.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    /// Current fault breaker state.
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Drop every cached batch-level result.
    pub fn clear_batch_cache(&self) {
        self.batch_cache.clear();
    }

    /// Drop batch-level results whose key contains `pattern`; returns
    /// the number of entries removed. Keys embed the uppercased
    /// symbols, so a symbol works as a pattern.
    pub fn invalidate_batch_cache(&self, pattern: &str) -> usize {
        self.batch_cache.invalidate(pattern)
    }

    /// Cache key for a batch run: order- and case-insensitive over the
    /// symbols, matching the per-symbol key casing.
    fn batch_key(kind: DataKind, symbols: &[String]) -> String {
        let mut sorted: Vec<String> = symbols.iter().map(|s| s.to_uppercase()).collect();
        sorted.sort_unstable();
        format!("batch:{}:{}", kind.key_prefix(), sorted.join(","))
    }

    /// Drop duplicate symbols, first occurrence wins (case-insensitive).
    fn dedupe(symbols: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        symbols
            .iter()
            .filter(|s| seen.insert(s.to_uppercase()))
            .cloned()
            .collect()
    }

    /// Fetch the requested dataset for every symbol in the request.
    ///
    /// Infallible by construction: orchestration faults consume the
    /// outer retry budget and feed the breaker; once both are exhausted
    /// (or the breaker is open to begin with) the run degrades to an
    /// all-failed result instead of an error.
    pub async fn get_bulk_data(&self, request: BatchRequest) -> BatchResult {
        let start = Instant::now();
        let symbols = Self::dedupe(&request.symbols);

        for attempt in 0..=self.outer_retries {
            if !self.breaker.is_allowed() {
                warn!(
                    "Batch: breaker is {}, short-circuiting {} symbols",
                    self.breaker.state(),
                    symbols.len()
                );
                return BatchResult::all_failed(symbols, start.elapsed().as_millis() as u64);
            }

            match self.run_batch(&request, &symbols, start).await {
                Ok(result) => {
                    self.breaker.record_success();
                    return result;
                }
                Err(fault) => {
                    self.breaker.record_fault();
                    warn!(
                        "Batch: run attempt {}/{} faulted: {}",
                        attempt + 1,
                        self.outer_retries + 1,
                        fault
                    );
                }
            }
        }

        BatchResult::all_failed(symbols, start.elapsed().as_millis() as u64)
    }

    /// One batch run attempt.
    ///
    /// `Err` means the machinery faulted (a worker task died), never
    /// that an individual symbol failed.
    async fn run_batch(
        &self,
        request: &BatchRequest,
        symbols: &[String],
        start: Instant,
    ) -> Result<BatchResult, AggregatorError> {
        let total = symbols.len();
        let batch_key = Self::batch_key(request.kind, symbols);

        if request.use_cache {
            if let Some(mut cached) = self.batch_cache.get(&batch_key) {
                debug!("Batch: batch-level cache hit for {} symbols", total);
                cached.summary.from_cache = cached.summary.total;
                cached.summary.from_api = 0;
                cached.summary.duration_ms = start.elapsed().as_millis() as u64;
                return Ok(cached);
            }
        }

        let completed = Arc::new(AtomicUsize::new(0));
        let from_cache = Arc::new(AtomicUsize::new(0));
        let from_api = Arc::new(AtomicUsize::new(0));
        let executor = RetryExecutor::new(
            self.limiter.clone(),
            RetryPolicy::per_item(request.per_item_retries),
        );

        let mut succeeded = HashMap::new();
        let mut failed = Vec::new();

        for chunk in symbols.chunks(request.max_concurrency.max(1)) {
            let tasks: Vec<_> = chunk
                .iter()
                .map(|symbol| {
                    let symbol = symbol.clone();
                    let aggregator = self.aggregator.clone();
                    let cache = self.cache.clone();
                    let executor = executor.clone();
                    let tx = self.progress_tx.clone();
                    let completed = completed.clone();
                    let from_cache = from_cache.clone();
                    let from_api = from_api.clone();
                    let kind = request.kind;
                    let use_cache = request.use_cache;

                    tokio::spawn(async move {
                        let outcome = fetch_one(
                            &aggregator,
                            &cache,
                            &executor,
                            kind,
                            use_cache,
                            &symbol,
                            &from_cache,
                            &from_api,
                        )
                        .await;

                        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                        match &outcome {
                            Ok(data) => {
                                let _ = tx.send(ProgressEvent::update(
                                    symbol.clone(),
                                    data.clone(),
                                    done,
                                    total,
                                ));
                            }
                            Err(error) => {
                                let _ = tx.send(ProgressEvent::error(
                                    symbol.clone(),
                                    error.to_string(),
                                    done,
                                    total,
                                ));
                            }
                        }

                        (symbol, outcome)
                    })
                })
                .collect();

            for joined in join_all(tasks).await {
                match joined {
                    Ok((symbol, Ok(data))) => {
                        succeeded.insert(symbol, data);
                    }
                    Ok((symbol, Err(error))) => {
                        debug!("Batch: symbol {} failed: {}", symbol, error);
                        failed.push(symbol);
                    }
                    Err(join_error) => {
                        return Err(AggregatorError::OrchestrationFault {
                            message: join_error.to_string(),
                        });
                    }
                }
            }
        }

        let summary = BatchSummary {
            total,
            succeeded: succeeded.len(),
            failed: failed.len(),
            duration_ms: start.elapsed().as_millis() as u64,
            from_cache: from_cache.load(Ordering::SeqCst),
            from_api: from_api.load(Ordering::SeqCst),
        };
        info!(
            "Batch: {}/{} symbols in {}ms ({} cached, {} fetched)",
            summary.succeeded, summary.total, summary.duration_ms, summary.from_cache,
            summary.from_api
        );

        let result = BatchResult {
            succeeded,
            failed,
            summary,
        };

        if request.use_cache && !result.succeeded.is_empty() {
            self.batch_cache
                .insert(batch_key, result.clone(), self.ttl_batch);
        }

        let _ = self.progress_tx.send(ProgressEvent::complete(total));

        Ok(result)
    }
}

/// Resolve one symbol: per-symbol cache first (when allowed), then the
/// fallback chain under the per-item retry policy.
///
/// An exhausted chain surfaces as `NoData`, which the per-item
/// condition retries alongside the transient classes.
#[allow(clippy::too_many_arguments)]
async fn fetch_one(
    aggregator: &Arc<FallbackAggregator>,
    cache: &TtlCache<MarketData>,
    executor: &RetryExecutor,
    kind: DataKind,
    use_cache: bool,
    symbol: &str,
    from_cache: &AtomicUsize,
    from_api: &AtomicUsize,
) -> Result<MarketData, AggregatorError> {
    if use_cache {
        let key = match kind {
            DataKind::Quote => FallbackAggregator::quote_key(symbol),
            DataKind::Financials => FallbackAggregator::financials_key(symbol),
        };
        if let Some(data) = cache.get(&key) {
            from_cache.fetch_add(1, Ordering::SeqCst);
            return Ok(data);
        }
    }

    let data = executor
        .execute_if(
            || {
                let aggregator = aggregator.clone();
                let symbol = symbol.to_string();
                async move {
                    let fetched = if use_cache {
                        match kind {
                            DataKind::Quote => {
                                aggregator.get_quote(&symbol).await.map(MarketData::Quote)
                            }
                            DataKind::Financials => aggregator
                                .get_financials(&symbol)
                                .await
                                .map(MarketData::Financials),
                        }
                    } else {
                        match kind {
                            DataKind::Quote => aggregator
                                .refresh_quote(&symbol)
                                .await
                                .map(MarketData::Quote),
                            DataKind::Financials => aggregator
                                .refresh_financials(&symbol)
                                .await
                                .map(MarketData::Financials),
                        }
                    };
                    fetched.ok_or(AggregatorError::NoData { symbol })
                }
            },
            |e| matches!(e, AggregatorError::NoData { .. }) || e.is_retryable(),
        )
        .await?;

    from_api.fetch_add(1, Ordering::SeqCst);
    Ok(data)
}
