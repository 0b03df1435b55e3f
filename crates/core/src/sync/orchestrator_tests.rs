//! Tests for SyncOrchestrator contracts and edge cases.
//!
//! # Critical Contract Points
//!
//! 1. Budget: no provider call once the daily limit is reached; usage resets
//!    when the date rolls over
//! 2. Deduplication: concurrent syncs of one symbol issue exactly one call
//! 3. Sweep status: halts and failures are reflected in the counts
//! 4. Failures are recorded per stock and never abort the sweep

#[cfg(test)]
mod tests {
    use crate::errors::{Error, Result};
    use crate::stocks::{InMemoryStockStore, Stock, StockStore};
    use crate::sync::{SweepStatus, SyncBudget, SyncConfig, SyncMode, SyncOrchestrator};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
    use rottenstocks_market_data::{
        AlphaVantageProvider, CircuitBreaker, CircuitBreakerConfig, CircuitState,
        CompanyOverview, ErrorKind, MarketDataError, MarketDataProvider, ProviderRequest,
        ProviderTransport, RateLimitConfig, RateLimiter, RawResponse, ResilientExecutor,
        RetryPolicy, SearchResult, StockQuote,
    };
    use rottenstocks_market_data::provider::TransportFailure;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    // =========================================================================
    // Mock Provider
    // =========================================================================

    #[derive(Default)]
    struct MockProvider {
        prices: Mutex<HashMap<String, Decimal>>,
        failures: Mutex<HashMap<String, MarketDataError>>,
        fail_overview: bool,
        latency: Option<Duration>,
        quote_calls: AtomicUsize,
        overview_calls: AtomicUsize,
    }

    impl MockProvider {
        fn new() -> Self {
            Self::default()
        }

        fn with_latency(latency: Duration) -> Self {
            Self {
                latency: Some(latency),
                ..Default::default()
            }
        }

        fn fail(&self, symbol: &str, error: MarketDataError) {
            self.failures
                .lock()
                .unwrap()
                .insert(symbol.to_string(), error);
        }

        fn quote_calls(&self) -> usize {
            self.quote_calls.load(Ordering::SeqCst)
        }

        fn overview_calls(&self) -> usize {
            self.overview_calls.load(Ordering::SeqCst)
        }
    }

    fn not_found(symbol: &str) -> MarketDataError {
        MarketDataError::ClientError {
            provider: "MOCK".to_string(),
            status: None,
            message: format!("Invalid API call for {}", symbol),
        }
    }

    #[async_trait]
    impl MarketDataProvider for MockProvider {
        fn id(&self) -> &'static str {
            "MOCK"
        }

        async fn get_quote(&self, symbol: &str) -> std::result::Result<StockQuote, MarketDataError> {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if let Some(error) = self.failures.lock().unwrap().get(symbol) {
                return Err(error.clone());
            }
            let price = self
                .prices
                .lock()
                .unwrap()
                .get(symbol)
                .copied()
                .unwrap_or(dec!(100));
            Ok(StockQuote::new(symbol, price, "MOCK"))
        }

        async fn get_company_overview(
            &self,
            symbol: &str,
        ) -> std::result::Result<CompanyOverview, MarketDataError> {
            self.overview_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_overview {
                return Err(MarketDataError::ServiceUnavailable {
                    provider: "MOCK".to_string(),
                    status: Some(503),
                    message: "overview down".to_string(),
                });
            }
            Ok(CompanyOverview {
                symbol: symbol.to_string(),
                name: format!("{} Inc", symbol),
                sector: Some("TECHNOLOGY".to_string()),
                ..Default::default()
            })
        }

        async fn search_symbols(
            &self,
            _keywords: &str,
        ) -> std::result::Result<Vec<SearchResult>, MarketDataError> {
            Ok(Vec::new())
        }
    }

    // =========================================================================
    // Mock Store
    // =========================================================================

    struct FailingStore;

    #[async_trait]
    impl StockStore for FailingStore {
        async fn list(&self) -> Result<Vec<Stock>> {
            Err(Error::Storage("connection lost".to_string()))
        }

        async fn get_by_symbol(&self, _symbol: &str) -> Result<Option<Stock>> {
            Err(Error::Storage("connection lost".to_string()))
        }

        async fn upsert(&self, _stock: &Stock) -> Result<Stock> {
            Err(Error::Storage("connection lost".to_string()))
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn config(daily_limit: u32) -> SyncConfig {
        SyncConfig {
            daily_request_limit: daily_limit,
            batch_size: 50,
            inter_request_delay: Duration::ZERO,
            sweep_mode: SyncMode::Quick,
        }
    }

    fn symbols(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("SYM{}", i)).collect()
    }

    fn store_with(symbols: &[String]) -> Arc<InMemoryStockStore> {
        Arc::new(InMemoryStockStore::with_stocks(
            symbols.iter().map(Stock::new),
        ))
    }

    fn orchestrator(
        provider: Arc<MockProvider>,
        store: Arc<dyn StockStore>,
        config: SyncConfig,
    ) -> SyncOrchestrator {
        SyncOrchestrator::new(provider, store, config)
    }

    // =========================================================================
    // Budget
    // =========================================================================

    #[tokio::test]
    async fn test_26th_stock_skipped_without_network_call() {
        let provider = Arc::new(MockProvider::new());
        let orch = orchestrator(provider.clone(), store_with(&symbols(26)), config(25));

        let result = orch.run_synchronization_sweep().await;

        assert_eq!(provider.quote_calls(), 25);
        assert_eq!(result.processed, 25);
        assert_eq!(result.succeeded, 25);
        assert_eq!(result.failed, 0);
        assert_eq!(result.requests_used, 25);
        assert_eq!(result.status, SweepStatus::PartialFailure);
        assert!(result.skipped_reason.is_some());
    }

    #[tokio::test]
    async fn test_exhausted_budget_skips_whole_sweep() {
        let provider = Arc::new(MockProvider::new());
        let orch = orchestrator(provider.clone(), store_with(&symbols(3)), config(3));

        let first = orch.run_synchronization_sweep().await;
        assert_eq!(first.status, SweepStatus::Completed);
        assert_eq!(provider.quote_calls(), 3);

        let second = orch.run_synchronization_sweep().await;
        assert_eq!(second.status, SweepStatus::SkippedBudget);
        assert_eq!(second.processed, 0);
        assert_eq!(provider.quote_calls(), 3);
    }

    #[tokio::test]
    async fn test_budget_resets_after_date_rollover() {
        let provider = Arc::new(MockProvider::new());
        let today = Arc::new(Mutex::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
        let source = today.clone();
        let budget = SyncBudget::with_date_source(2, Arc::new(move || *source.lock().unwrap()));
        let orch = SyncOrchestrator::with_budget(
            provider.clone(),
            store_with(&symbols(4)),
            config(2),
            budget,
        );

        let result = orch.run_synchronization_sweep().await;
        assert_eq!(result.succeeded, 2);
        assert_eq!(
            orch.run_synchronization_sweep().await.status,
            SweepStatus::SkippedBudget
        );

        *today.lock().unwrap() = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();

        let result = orch.run_synchronization_sweep().await;
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.requests_used, 2);
        assert_eq!(provider.quote_calls(), 4);
        assert_eq!(
            orch.budget().last_reset_date,
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
        );
    }

    #[tokio::test]
    async fn test_mid_sweep_halt_counts() {
        // Failed calls are refunded: SYM1 fails, so four stocks are
        // attempted before the limit of three is reached.
        let provider = Arc::new(MockProvider::new());
        provider.fail("SYM1", not_found("SYM1"));
        let orch = orchestrator(provider.clone(), store_with(&symbols(5)), config(3));

        let result = orch.run_synchronization_sweep().await;

        assert_eq!(result.status, SweepStatus::PartialFailure);
        assert_eq!(result.processed, 4);
        assert_eq!(result.succeeded, 3);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, Some(ErrorKind::ClientError));
        assert_eq!(result.requests_used, 3);
        assert_eq!(provider.quote_calls(), 4);
        assert!(result.skipped_reason.is_some());
    }

    // =========================================================================
    // Deduplication
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_syncs_issue_one_call() {
        let provider = Arc::new(MockProvider::with_latency(Duration::from_millis(500)));
        provider
            .prices
            .lock()
            .unwrap()
            .insert("AAPL".to_string(), dec!(189.98));
        let orch = orchestrator(
            provider.clone(),
            store_with(&["AAPL".to_string()]),
            config(25),
        );

        let (first, second) = tokio::join!(orch.sync_symbol("AAPL"), orch.sync_symbol("aapl"));

        assert_eq!(provider.quote_calls(), 1);
        let first = first.unwrap();
        let second = second.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.current_price, Some(dec!(189.98)));
        assert_eq!(orch.budget().requests_used_today, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failure_shared() {
        let provider = Arc::new(MockProvider::with_latency(Duration::from_millis(500)));
        provider.fail("IBM", not_found("IBM"));
        let orch = orchestrator(
            provider.clone(),
            store_with(&["IBM".to_string()]),
            config(25),
        );

        let results =
            futures::future::join_all((0..3).map(|_| orch.sync_symbol("IBM"))).await;

        assert_eq!(provider.quote_calls(), 1);
        assert!(results.iter().all(|r| matches!(r, Err(Error::MarketData(_)))));
        assert_eq!(orch.budget().requests_used_today, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_and_add_share_in_flight_call() {
        let provider = Arc::new(MockProvider::with_latency(Duration::from_millis(500)));
        let orch = orchestrator(
            provider.clone(),
            store_with(&["MSFT".to_string()]),
            config(25),
        );

        let (sweep, added) = tokio::join!(
            orch.run_synchronization_sweep(),
            orch.add_or_refresh_symbol("MSFT")
        );

        assert_eq!(sweep.succeeded, 1);
        assert!(added.is_ok());
        assert_eq!(provider.quote_calls(), 1);
    }

    // =========================================================================
    // Sweep behavior
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_reentrant_sweep_rejected() {
        let provider = Arc::new(MockProvider::with_latency(Duration::from_millis(500)));
        let orch = orchestrator(provider.clone(), store_with(&symbols(2)), config(25));

        let (first, second) = tokio::join!(
            orch.run_synchronization_sweep(),
            orch.run_synchronization_sweep()
        );

        assert_eq!(first.status, SweepStatus::Completed);
        assert_eq!(first.processed, 2);
        assert_eq!(second.status, SweepStatus::AlreadyRunning);
        assert_eq!(second.processed, 0);
        assert_eq!(provider.quote_calls(), 2);
        assert!(!orch.is_sweep_running());
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_sweep() {
        let provider = Arc::new(MockProvider::new());
        provider.fail("SYM0", not_found("SYM0"));
        provider.fail("SYM2", not_found("SYM2"));
        let orch = orchestrator(provider.clone(), store_with(&symbols(4)), config(25));

        let result = orch.run_synchronization_sweep().await;

        assert_eq!(result.status, SweepStatus::PartialFailure);
        assert_eq!(result.processed, 4);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 2);
        assert!(result.skipped_reason.is_none());
        let mut failed: Vec<&str> = result.errors.iter().map(|e| e.symbol.as_str()).collect();
        failed.sort_unstable();
        assert_eq!(failed, vec!["SYM0", "SYM2"]);
    }

    #[tokio::test]
    async fn test_all_failures_is_failed() {
        let provider = Arc::new(MockProvider::new());
        for symbol in symbols(2) {
            provider.fail(&symbol, not_found(&symbol));
        }
        let orch = orchestrator(provider.clone(), store_with(&symbols(2)), config(25));

        let result = orch.run_synchronization_sweep().await;

        assert_eq!(result.status, SweepStatus::Failed);
        assert_eq!(result.failed, 2);
        assert_eq!(result.requests_used, 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_failed_sweep() {
        let provider = Arc::new(MockProvider::new());
        let orch = orchestrator(provider.clone(), Arc::new(FailingStore), config(25));

        let result = orch.run_synchronization_sweep().await;

        assert_eq!(result.status, SweepStatus::Failed);
        assert_eq!(result.processed, 0);
        assert!(result
            .skipped_reason
            .as_deref()
            .is_some_and(|r| r.contains("connection lost")));
        assert_eq!(provider.quote_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_store_completes() {
        let provider = Arc::new(MockProvider::new());
        let orch = orchestrator(provider.clone(), store_with(&[]), config(25));

        let result = orch.run_synchronization_sweep().await;

        assert_eq!(result.status, SweepStatus::Completed);
        assert_eq!(result.processed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inter_request_delay_between_stocks() {
        let provider = Arc::new(MockProvider::new());
        let mut cfg = config(25);
        cfg.inter_request_delay = Duration::from_secs(1);
        let orch = orchestrator(provider.clone(), store_with(&symbols(3)), cfg);

        let start = tokio::time::Instant::now();
        orch.run_synchronization_sweep().await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_working_set_order_and_batch_size() {
        let now = Utc::now();
        let mut old = Stock::new("OLD");
        old.last_updated = Some(now - ChronoDuration::hours(5));
        let mut recent = Stock::new("RECENT");
        recent.last_updated = Some(now - ChronoDuration::minutes(5));
        let never = Stock::new("NEVER");
        let mut inactive = Stock::new("GONE");
        inactive.is_active = false;

        let store = Arc::new(InMemoryStockStore::with_stocks(vec![
            recent, old, never, inactive,
        ]));
        let mut cfg = config(25);
        cfg.batch_size = 2;
        let orch = orchestrator(Arc::new(MockProvider::new()), store, cfg);

        let working_set = orch.select_working_set().await.unwrap();
        let order: Vec<&str> = working_set.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(order, vec!["NEVER", "OLD"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_concurrent_refresh() {
        let provider = Arc::new(MockProvider::new());
        let store = store_with(&["AAA".to_string(), "BBB".to_string()]);
        let mut cfg = config(25);
        cfg.inter_request_delay = Duration::from_secs(10);
        let orch = orchestrator(provider.clone(), store.clone(), cfg);

        // BBB is refreshed while the sweep waits between AAA and BBB
        let (sweep, refreshed) = tokio::join!(orch.run_synchronization_sweep(), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            orch.add_or_refresh_symbol("BBB").await
        });

        assert_eq!(sweep.succeeded, 2);
        assert_eq!(refreshed.unwrap().sector.as_deref(), Some("TECHNOLOGY"));
        let stored = store.get_by_symbol("BBB").await.unwrap().unwrap();
        assert_eq!(stored.sector.as_deref(), Some("TECHNOLOGY"));
        assert_eq!(stored.name, "BBB Inc");
        assert_eq!(provider.quote_calls(), 3);
        assert_eq!(provider.overview_calls(), 1);
    }

    // =========================================================================
    // Sync modes
    // =========================================================================

    #[tokio::test]
    async fn test_full_mode_fetches_overview() {
        let provider = Arc::new(MockProvider::new());
        let store = store_with(&["NVDA".to_string()]);
        let mut cfg = config(25);
        cfg.sweep_mode = SyncMode::Full;
        let orch = orchestrator(provider.clone(), store.clone(), cfg);

        let result = orch.run_synchronization_sweep().await;

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.requests_used, 2);
        assert_eq!(provider.overview_calls(), 1);
        let stock = store.get_by_symbol("NVDA").await.unwrap().unwrap();
        assert_eq!(stock.name, "NVDA Inc");
        assert_eq!(stock.sector.as_deref(), Some("TECHNOLOGY"));
    }

    #[tokio::test]
    async fn test_overview_failure_not_fatal() {
        let provider = Arc::new(MockProvider {
            fail_overview: true,
            ..Default::default()
        });
        let store = Arc::new(InMemoryStockStore::new());
        let orch = orchestrator(provider.clone(), store.clone(), config(25));

        let stock = orch.add_or_refresh_symbol(" amd ").await.unwrap();

        assert_eq!(stock.symbol, "AMD");
        assert_eq!(stock.name, "AMD");
        assert!(stock.current_price.is_some());
        assert_eq!(provider.overview_calls(), 1);
        // Only the quote is charged
        assert_eq!(orch.budget().requests_used_today, 1);
        assert!(store.get_by_symbol("AMD").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_overview_skipped_when_budget_allows_only_quote() {
        let provider = Arc::new(MockProvider::new());
        let orch = orchestrator(provider.clone(), Arc::new(InMemoryStockStore::new()), config(1));

        let stock = orch.add_or_refresh_symbol("TSLA").await.unwrap();

        assert!(stock.current_price.is_some());
        assert_eq!(provider.overview_calls(), 0);
        assert_eq!(orch.budget().remaining, 0);
    }

    // =========================================================================
    // Single-symbol paths
    // =========================================================================

    #[tokio::test]
    async fn test_sync_symbol_unknown_is_not_found() {
        let provider = Arc::new(MockProvider::new());
        let orch = orchestrator(provider.clone(), store_with(&[]), config(25));

        let err = orch.sync_symbol("ZZZ").await.unwrap_err();

        assert_eq!(err, Error::NotFound("ZZZ".to_string()));
        assert_eq!(provider.quote_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_symbol_rejected_before_network() {
        let provider = Arc::new(MockProvider::new());
        let orch = orchestrator(provider.clone(), store_with(&[]), config(25));

        let err = orch.add_or_refresh_symbol("WAYTOOLONGSYMBOL").await.unwrap_err();

        assert_eq!(err.market_data_kind(), Some(ErrorKind::ClientError));
        assert_eq!(provider.quote_calls(), 0);
    }

    #[tokio::test]
    async fn test_sync_stats() {
        let now = Utc::now();
        let mut fresh = Stock::new("FRESH");
        fresh.last_updated = Some(now);
        let mut inactive = Stock::new("GONE");
        inactive.is_active = false;
        let store = Arc::new(InMemoryStockStore::with_stocks(vec![
            fresh,
            Stock::new("STALE"),
            inactive,
        ]));
        let orch = orchestrator(Arc::new(MockProvider::new()), store, config(25));

        let stats = orch.sync_stats().await.unwrap();
        assert_eq!(stats.total_stocks, 3);
        assert_eq!(stats.active_stocks, 2);
        assert_eq!(stats.stale_stocks, 1);
        assert_eq!(stats.requests_remaining, 25);
        assert!(stats.last_sweep_finished_at.is_none());

        orch.run_synchronization_sweep().await;

        let stats = orch.sync_stats().await.unwrap();
        assert_eq!(stats.stale_stocks, 0);
        assert_eq!(stats.requests_used_today, 2);
        assert!(!stats.sweep_running);
        assert!(stats.last_sweep_finished_at.is_some());
    }

    #[tokio::test]
    async fn test_sweep_result_serializes() {
        let orch = orchestrator(Arc::new(MockProvider::new()), store_with(&symbols(1)), config(25));

        let result = orch.run_synchronization_sweep().await;
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["status"], "completed");
        assert_eq!(json["processed"], 1);
        assert!(json["skippedReason"].is_null());
    }

    // =========================================================================
    // Through the resilience layer
    // =========================================================================

    /// Transport that always answers 503.
    struct DownTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProviderTransport for DownTransport {
        fn provider_id(&self) -> &'static str {
            "ALPHA_VANTAGE"
        }

        async fn send(
            &self,
            _request: &ProviderRequest,
            _correlation_id: &str,
        ) -> std::result::Result<RawResponse, TransportFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawResponse::with_status(503, ""))
        }
    }

    #[tokio::test]
    async fn test_open_circuit_rechecked_per_stock() {
        let executor = Arc::new(ResilientExecutor::with_components(
            RateLimiter::with_default_config(RateLimitConfig {
                requests_per_window: 100,
                ..Default::default()
            }),
            CircuitBreaker::with_config(CircuitBreakerConfig {
                failure_threshold: 2,
                ..Default::default()
            }),
            RetryPolicy::none(),
        ));
        let transport = Arc::new(DownTransport {
            calls: AtomicUsize::new(0),
        });
        let provider = Arc::new(AlphaVantageProvider::with_transport(
            transport.clone(),
            executor.clone(),
        ));
        let orch = SyncOrchestrator::new(provider, store_with(&symbols(5)), config(25));

        let result = orch.run_synchronization_sweep().await;

        assert_eq!(result.status, SweepStatus::Failed);
        assert_eq!(result.processed, 5);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        let kinds: Vec<Option<ErrorKind>> = result.errors.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds.iter().filter(|k| **k == Some(ErrorKind::CircuitOpen)).count(),
            3
        );
        assert_eq!(executor.circuit_state("ALPHA_VANTAGE").state, CircuitState::Open);
        assert_eq!(result.requests_used, 0);
    }
}
