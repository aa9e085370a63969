//! Prioritized fallback chain over the registered sources.
//!
//! Per call: cache check, then each source in fixed priority order -
//! probe, fetch, validate - stopping at the first valid result
//! (first-success-wins, cost-minimizing, not quality-maximizing).
//! Exhausting every source yields `None`, a normal empty result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, warn};

use crate::cache::TtlCache;
use crate::config::AggregatorConfig;
use crate::limiter::PacingLimiter;
use crate::models::{FinancialStatement, MarketData, Quote};
use crate::source::{MarketSource, SourceOutcome};

use super::validator::{QuoteValidator, ValidatorConfig};

/// Tries sources in priority order, validates results and populates the
/// shared cache.
pub struct FallbackAggregator {
    /// Sources in priority order, fixed at construction.
    sources: Vec<Arc<dyn MarketSource>>,
    /// Shared per-symbol cache.
    cache: Arc<TtlCache<MarketData>>,
    /// Shared process-wide pacing limiter.
    limiter: Arc<PacingLimiter>,
    validator: QuoteValidator,
    ttl_quote: Duration,
    ttl_financials: Duration,
}

impl FallbackAggregator {
    /// Create an aggregator over the given sources.
    ///
    /// Sources are sorted by [`MarketSource::priority`] once, here;
    /// the order never changes afterwards.
    pub fn new(
        mut sources: Vec<Arc<dyn MarketSource>>,
        cache: Arc<TtlCache<MarketData>>,
        limiter: Arc<PacingLimiter>,
        config: &AggregatorConfig,
    ) -> Self {
        sources.sort_by_key(|s| s.priority());

        let validator = QuoteValidator::with_config(ValidatorConfig {
            max_deviation_pct: Some(config.max_deviation_pct),
            ..Default::default()
        });

        Self {
            sources,
            cache,
            limiter,
            validator,
            ttl_quote: config.ttl_quote,
            ttl_financials: config.ttl_financials,
        }
    }

    /// Cache key for a symbol's quote entry.
    pub fn quote_key(symbol: &str) -> String {
        format!("quote:{}", symbol.to_uppercase())
    }

    /// Cache key for a symbol's financials entry.
    pub fn financials_key(symbol: &str) -> String {
        format!("financials:{}", symbol.to_uppercase())
    }

    /// Get the latest quote for a symbol.
    ///
    /// A fresh cache entry is returned without invoking any source.
    /// Otherwise sources are tried in priority order and the first
    /// valid result is cached and returned. `None` means every source
    /// was exhausted - a normal empty result, not an error.
    pub async fn get_quote(&self, symbol: &str) -> Option<Quote> {
        let key = Self::quote_key(symbol);

        if let Some(MarketData::Quote(cached)) = self.cache.get(&key) {
            debug!("Aggregator: quote cache hit for {}", symbol);
            return Some(cached);
        }

        self.refresh_quote(symbol).await
    }

    /// Fetch a quote from the sources, skipping the cache read.
    ///
    /// A valid result still lands in the cache for later readers. Used
    /// for forced refreshes.
    pub async fn refresh_quote(&self, symbol: &str) -> Option<Quote> {
        let key = Self::quote_key(symbol);

        // Plausibility baseline: only a still-fresh cached quote. Once
        // the entry expires (or is invalidated) any price is accepted,
        // so a legitimate large move never wedges the symbol.
        let previous_price = match self.cache.get(&key) {
            Some(MarketData::Quote(cached)) => Some(cached.price),
            _ => None,
        };

        for source in &self.sources {
            if !source.probe().await {
                debug!("Aggregator: source '{}' probe failed, skipping", source.id());
                continue;
            }

            self.limiter.acquire().await;

            match SourceOutcome::from(source.get_quote(symbol).await) {
                SourceOutcome::Found(quote) => {
                    if let Err(e) = self.validator.validate_quote(&quote, previous_price) {
                        warn!("Aggregator: '{}' quote rejected: {}", source.id(), e);
                        continue;
                    }

                    debug!(
                        "Aggregator: quote for {} from '{}' at {}",
                        symbol,
                        source.id(),
                        quote.price
                    );
                    self.cache
                        .insert(key, MarketData::Quote(quote.clone()), self.ttl_quote);
                    return Some(quote);
                }
                SourceOutcome::NotFound => {
                    debug!("Aggregator: '{}' has no quote for {}", source.id(), symbol);
                }
                SourceOutcome::Transient(e) => {
                    warn!("Aggregator: '{}' quote fetch failed: {}", source.id(), e);
                }
            }
        }

        debug!("Aggregator: all sources exhausted for quote {}", symbol);
        None
    }

    /// Get the latest financial statement for a symbol.
    ///
    /// Identical algorithm to [`get_quote`](Self::get_quote) with the
    /// financials validity predicate and the long financials TTL.
    pub async fn get_financials(&self, symbol: &str) -> Option<FinancialStatement> {
        let key = Self::financials_key(symbol);

        if let Some(MarketData::Financials(cached)) = self.cache.get(&key) {
            debug!("Aggregator: financials cache hit for {}", symbol);
            return Some(cached);
        }

        self.refresh_financials(symbol).await
    }

    /// Fetch a financial statement from the sources, skipping the cache
    /// read. A valid result still lands in the cache.
    pub async fn refresh_financials(&self, symbol: &str) -> Option<FinancialStatement> {
        let key = Self::financials_key(symbol);

        for source in &self.sources {
            if !source.probe().await {
                debug!("Aggregator: source '{}' probe failed, skipping", source.id());
                continue;
            }

            self.limiter.acquire().await;

            match SourceOutcome::from(source.get_financials(symbol).await) {
                SourceOutcome::Found(statement) => {
                    if let Err(e) = self.validator.validate_financials(&statement) {
                        warn!("Aggregator: '{}' financials rejected: {}", source.id(), e);
                        continue;
                    }

                    self.cache.insert(
                        key,
                        MarketData::Financials(statement.clone()),
                        self.ttl_financials,
                    );
                    return Some(statement);
                }
                SourceOutcome::NotFound => {
                    debug!(
                        "Aggregator: '{}' has no financials for {}",
                        source.id(),
                        symbol
                    );
                }
                SourceOutcome::Transient(e) => {
                    warn!("Aggregator: '{}' financials fetch failed: {}", source.id(), e);
                }
            }
        }

        debug!("Aggregator: all sources exhausted for financials {}", symbol);
        None
    }

    /// Probe every source concurrently and report `id -> alive`.
    ///
    /// Order-independent; a probe that fails internally reports `false`.
    pub async fn sources_health(&self) -> HashMap<String, bool> {
        let probes = self.sources.iter().map(|source| async move {
            let alive = source.probe().await;
            (source.id().to_string(), alive)
        });

        join_all(probes).await.into_iter().collect()
    }

    /// Registered source ids in priority order.
    pub fn source_ids(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PacingConfig;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::errors::AggregatorError;

    /// What a mock source should do on fetch.
    enum MockBehavior {
        Quote(Decimal),
        NoData,
        Fail,
    }

    struct MockSource {
        id: &'static str,
        priority: u8,
        probe_ok: bool,
        behavior: Mutex<MockBehavior>,
        probe_calls: AtomicUsize,
        fetch_calls: AtomicUsize,
    }

    impl MockSource {
        fn new(id: &'static str, priority: u8, probe_ok: bool, behavior: MockBehavior) -> Arc<Self> {
            Arc::new(Self {
                id,
                priority,
                probe_ok,
                behavior: Mutex::new(behavior),
                probe_calls: AtomicUsize::new(0),
                fetch_calls: AtomicUsize::new(0),
            })
        }

        fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }
    }

    #[async_trait]
    impl MarketSource for MockSource {
        fn id(&self) -> &'static str {
            self.id
        }

        fn priority(&self) -> u8 {
            self.priority
        }

        async fn probe(&self) -> bool {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            self.probe_ok
        }

        async fn get_quote(&self, symbol: &str) -> Result<Option<Quote>, AggregatorError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            match &*self.behavior.lock().unwrap() {
                MockBehavior::Quote(price) => Ok(Some(Quote::new(
                    symbol,
                    *price,
                    dec!(0.5),
                    1_000,
                    Utc::now(),
                    self.id,
                ))),
                MockBehavior::NoData => Ok(None),
                MockBehavior::Fail => Err(AggregatorError::SourceCallFailed {
                    source_id: self.id.to_string(),
                    message: "mock failure".to_string(),
                }),
            }
        }

        async fn get_financials(
            &self,
            symbol: &str,
        ) -> Result<Option<FinancialStatement>, AggregatorError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            match &*self.behavior.lock().unwrap() {
                MockBehavior::Quote(assets) => Ok(Some(FinancialStatement {
                    symbol: symbol.to_string(),
                    company_name: "Mock Corp".to_string(),
                    total_assets: *assets,
                    total_liabilities: dec!(100),
                    equity: dec!(50),
                    net_profit: dec!(10),
                    revenue: None,
                    period: None,
                    source: self.id.to_string(),
                })),
                MockBehavior::NoData => Ok(None),
                MockBehavior::Fail => Err(AggregatorError::SourceCallFailed {
                    source_id: self.id.to_string(),
                    message: "mock failure".to_string(),
                }),
            }
        }
    }

    fn unpaced_config() -> AggregatorConfig {
        AggregatorConfig {
            pacing: PacingConfig {
                min_interval: Duration::ZERO,
                max_per_window: u32::MAX,
                window: Duration::from_secs(60),
            },
            ..Default::default()
        }
    }

    fn make_aggregator(sources: Vec<Arc<dyn MarketSource>>) -> FallbackAggregator {
        let config = unpaced_config();
        FallbackAggregator::new(
            sources,
            Arc::new(TtlCache::new()),
            Arc::new(PacingLimiter::with_config(config.pacing.clone())),
            &config,
        )
    }

    #[tokio::test]
    async fn test_fresh_cache_invokes_no_source() {
        let source = MockSource::new("ONLY", 1, true, MockBehavior::Quote(dec!(150)));
        let aggregator = make_aggregator(vec![source.clone()]);

        // First call populates the cache.
        aggregator.get_quote("AAPL").await.unwrap();
        let fetches_after_first = source.fetch_calls.load(Ordering::SeqCst);

        // Second call must be served from cache alone.
        let quote = aggregator.get_quote("AAPL").await.unwrap();
        assert_eq!(quote.price, dec!(150));
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), fetches_after_first);
        assert_eq!(source.probe_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_fresh_cache() {
        let source = MockSource::new("ONLY", 1, true, MockBehavior::Quote(dec!(150)));
        let aggregator = make_aggregator(vec![source.clone()]);

        aggregator.get_quote("AAPL").await.unwrap();
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 1);

        // A forced refresh re-fetches even though the entry is fresh.
        aggregator.refresh_quote("AAPL").await.unwrap();
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let first = MockSource::new("FIRST", 1, true, MockBehavior::Quote(dec!(100)));
        let second = MockSource::new("SECOND", 2, true, MockBehavior::Quote(dec!(999)));
        let aggregator = make_aggregator(vec![first.clone(), second.clone()]);

        let quote = aggregator.get_quote("AAPL").await.unwrap();

        assert_eq!(quote.price, dec!(100));
        assert_eq!(quote.source, "FIRST");
        assert_eq!(second.fetch_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.probe_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_priority_order_fixed_at_construction() {
        // Registered out of order; priority decides.
        let low = MockSource::new("LOW", 20, true, MockBehavior::Quote(dec!(1)));
        let high = MockSource::new("HIGH", 1, true, MockBehavior::Quote(dec!(2)));
        let aggregator = make_aggregator(vec![low, high]);

        assert_eq!(aggregator.source_ids(), vec!["HIGH", "LOW"]);
        let quote = aggregator.get_quote("AAPL").await.unwrap();
        assert_eq!(quote.source, "HIGH");
    }

    #[tokio::test]
    async fn test_failed_probe_skips_without_fetch() {
        let down = MockSource::new("DOWN", 1, false, MockBehavior::Quote(dec!(1)));
        let up = MockSource::new("UP", 2, true, MockBehavior::Quote(dec!(150.25)));
        let aggregator = make_aggregator(vec![down.clone(), up]);

        let quote = aggregator.get_quote("AAPL").await.unwrap();

        assert_eq!(quote.source, "UP");
        assert_eq!(down.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_throwing_source_falls_through() {
        let failing = MockSource::new("FAILING", 1, true, MockBehavior::Fail);
        let working = MockSource::new("WORKING", 2, true, MockBehavior::Quote(dec!(150.25)));
        let aggregator = make_aggregator(vec![failing.clone(), working.clone()]);

        let quote = aggregator.get_quote("AAPL").await.unwrap();

        assert_eq!(quote.price, dec!(150.25));
        assert_eq!(failing.fetch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(working.fetch_calls.load(Ordering::SeqCst), 1);

        // The successful result is now cached under the quote key.
        let stats = aggregator.cache.stats();
        assert!(stats.keys.contains(&"quote:AAPL".to_string()));
    }

    #[tokio::test]
    async fn test_no_data_anywhere_returns_none() {
        let a = MockSource::new("A", 1, true, MockBehavior::NoData);
        let b = MockSource::new("B", 2, true, MockBehavior::Fail);
        let aggregator = make_aggregator(vec![a, b]);

        assert!(aggregator.get_quote("UNLISTED").await.is_none());
        assert_eq!(aggregator.cache.stats().size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_baseline_allows_large_move() {
        let source = MockSource::new("ONLY", 1, true, MockBehavior::Quote(dec!(100)));
        let aggregator = make_aggregator(vec![source.clone()]);

        aggregator.get_quote("AAPL").await.unwrap();

        // Past the quote TTL there is no fresh baseline; a price far
        // outside the deviation bound (split, long gap) must still be
        // accepted instead of wedging the symbol until restart.
        tokio::time::advance(Duration::from_secs(31)).await;
        source.set_behavior(MockBehavior::Quote(dec!(200)));

        let quote = aggregator.get_quote("AAPL").await.unwrap();
        assert_eq!(quote.price, dec!(200));
    }

    #[tokio::test]
    async fn test_forced_refresh_rejects_implausible_jump() {
        let source = MockSource::new("ONLY", 1, true, MockBehavior::Quote(dec!(100)));
        let aggregator = make_aggregator(vec![source.clone()]);

        aggregator.get_quote("AAPL").await.unwrap();

        // While the cached quote is fresh, a 200% jump on a forced
        // refresh fails the plausibility bound and the old value stays.
        source.set_behavior(MockBehavior::Quote(dec!(300)));
        assert!(aggregator.refresh_quote("AAPL").await.is_none());

        let quote = aggregator.get_quote("AAPL").await.unwrap();
        assert_eq!(quote.price, dec!(100));
    }

    #[tokio::test]
    async fn test_invalid_result_falls_through_to_next() {
        // Zero price fails the sanity predicate.
        let bogus = MockSource::new("BOGUS", 1, true, MockBehavior::Quote(dec!(0)));
        let good = MockSource::new("GOOD", 2, true, MockBehavior::Quote(dec!(42)));
        let aggregator = make_aggregator(vec![bogus, good]);

        let quote = aggregator.get_quote("AAPL").await.unwrap();
        assert_eq!(quote.source, "GOOD");
    }

    #[tokio::test]
    async fn test_financials_uses_own_key_space() {
        let source = MockSource::new("ONLY", 1, true, MockBehavior::Quote(dec!(5000)));
        let aggregator = make_aggregator(vec![source]);

        let statement = aggregator.get_financials("acme").await.unwrap();
        assert_eq!(statement.total_assets, dec!(5000));

        let stats = aggregator.cache.stats();
        assert_eq!(stats.keys, vec!["financials:ACME"]);
    }

    #[tokio::test]
    async fn test_sources_health_maps_probe_results() {
        let up = MockSource::new("UP", 1, true, MockBehavior::NoData);
        let down = MockSource::new("DOWN", 2, false, MockBehavior::NoData);
        let aggregator = make_aggregator(vec![up, down]);

        let health = aggregator.sources_health().await;
        assert_eq!(health.len(), 2);
        assert_eq!(health["UP"], true);
        assert_eq!(health["DOWN"], false);

        // Idempotent given unchanged source states.
        let again = aggregator.sources_health().await;
        assert_eq!(health, again);
    }
}
