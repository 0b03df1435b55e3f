//! Process-wide service context.
//!
//! Built once at startup and passed by reference to every consumer. It owns
//! the single executor (and with it the rate limiter and circuit breaker),
//! the provider, the stock store and the orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use rottenstocks_market_data::{
    normalize_symbol, AlphaVantageProvider, CircuitMetrics, CircuitSnapshot, MarketDataConfig,
    MarketDataProvider, ProviderTransport, RateLimitUsage, ResilientExecutor,
};

use crate::errors::{Error, Result};
use crate::stocks::{Stock, StockStore};
use crate::sync::{SweepResult, SyncConfig, SyncOrchestrator};

pub struct ServiceContext {
    executor: Arc<ResilientExecutor>,
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn StockStore>,
    orchestrator: Arc<SyncOrchestrator>,
    shut_down: AtomicBool,
}

impl ServiceContext {
    /// Build a context talking to Alpha Vantage over HTTP.
    pub fn new(
        api_key: String,
        market_data: &MarketDataConfig,
        sync: SyncConfig,
        store: Arc<dyn StockStore>,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::InvalidConfigValue(
                "Alpha Vantage API key is required".to_string(),
            ));
        }

        let executor = Arc::new(ResilientExecutor::new(market_data));
        let provider = Arc::new(AlphaVantageProvider::new(
            api_key,
            market_data.request_timeout,
            executor.clone(),
        ));
        Ok(Self::assemble(executor, provider, store, sync))
    }

    /// Build a context over an arbitrary transport.
    pub fn with_transport(
        transport: Arc<dyn ProviderTransport>,
        market_data: &MarketDataConfig,
        sync: SyncConfig,
        store: Arc<dyn StockStore>,
    ) -> Self {
        let executor = Arc::new(ResilientExecutor::new(market_data));
        let provider = Arc::new(AlphaVantageProvider::with_transport(
            transport,
            executor.clone(),
        ));
        Self::assemble(executor, provider, store, sync)
    }

    fn assemble(
        executor: Arc<ResilientExecutor>,
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn StockStore>,
        sync: SyncConfig,
    ) -> Self {
        info!(
            "Service context ready: provider {}, {} requests/day, {} sweep mode",
            provider.id(),
            sync.daily_request_limit,
            sync.sweep_mode
        );
        let orchestrator = Arc::new(SyncOrchestrator::new(
            provider.clone(),
            store.clone(),
            sync,
        ));
        Self {
            executor,
            provider,
            store,
            orchestrator,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn executor(&self) -> &Arc<ResilientExecutor> {
        &self.executor
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn store(&self) -> &Arc<dyn StockStore> {
        &self.store
    }

    pub fn provider_id(&self) -> &'static str {
        self.provider.id()
    }

    /// Start tracking `symbols` without fetching anything.
    ///
    /// Invalid symbols are skipped with a warning. Returns how many stocks
    /// were added.
    pub async fn seed_watchlist<I, S>(&self, symbols: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for raw in symbols {
            let symbol = match normalize_symbol(raw.as_ref()) {
                Ok(symbol) => symbol,
                Err(e) => {
                    warn!("Skipping watchlist entry: {}", e);
                    continue;
                }
            };
            if self.store.get_by_symbol(&symbol).await?.is_none() {
                self.store.upsert(&Stock::new(symbol)).await?;
                added += 1;
            }
        }
        Ok(added)
    }

    pub async fn run_synchronization_sweep(&self) -> SweepResult {
        self.orchestrator.run_synchronization_sweep().await
    }

    /// Rate-limit window usage for the configured provider.
    pub fn usage_snapshot(&self) -> RateLimitUsage {
        self.executor.usage_snapshot(self.provider_id())
    }

    /// Circuit state for the configured provider.
    pub fn circuit_state(&self) -> CircuitSnapshot {
        self.executor.circuit_state(self.provider_id())
    }

    pub fn circuit_metrics(&self) -> Vec<CircuitMetrics> {
        self.executor.circuit_metrics()
    }

    pub fn reset_circuit(&self) {
        info!("Manually resetting circuit for {}", self.provider_id());
        self.executor.reset_circuit(self.provider_id());
    }

    /// Log final usage. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let budget = self.orchestrator.budget();
        let circuit = self.circuit_state();
        info!(
            "Shutting down: {}/{} requests used on {}, circuit {:?} ({} failures)",
            budget.requests_used_today,
            budget.daily_limit,
            budget.last_reset_date,
            circuit.state,
            circuit.failure_count
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stocks::InMemoryStockStore;
    use crate::sync::SweepStatus;
    use async_trait::async_trait;
    use rottenstocks_market_data::provider::TransportFailure;
    use rottenstocks_market_data::{CircuitState, ProviderRequest, RawResponse};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct QuoteTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProviderTransport for QuoteTransport {
        fn provider_id(&self) -> &'static str {
            "ALPHA_VANTAGE"
        }

        async fn send(
            &self,
            request: &ProviderRequest,
            _correlation_id: &str,
        ) -> std::result::Result<RawResponse, TransportFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let symbol = request.get("symbol").unwrap_or_default();
            Ok(RawResponse::ok(format!(
                r#"{{"Global Quote": {{"01. symbol": "{}", "05. price": "101.5000"}}}}"#,
                symbol
            )))
        }
    }

    fn context() -> (ServiceContext, Arc<QuoteTransport>) {
        let transport = Arc::new(QuoteTransport {
            calls: AtomicUsize::new(0),
        });
        let sync = SyncConfig {
            inter_request_delay: Duration::ZERO,
            ..Default::default()
        };
        let ctx = ServiceContext::with_transport(
            transport.clone(),
            &MarketDataConfig::default(),
            sync,
            Arc::new(InMemoryStockStore::new()),
        );
        (ctx, transport)
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let result = ServiceContext::new(
            "  ".to_string(),
            &MarketDataConfig::default(),
            SyncConfig::default(),
            Arc::new(InMemoryStockStore::new()),
        );
        assert!(matches!(result, Err(Error::InvalidConfigValue(_))));
    }

    #[tokio::test]
    async fn test_seed_watchlist_normalizes_and_skips_invalid() {
        let (ctx, transport) = context();

        let added = ctx
            .seed_watchlist(["aapl", " MSFT ", "", "AAPL", "THISISTOOLONG"])
            .await
            .unwrap();

        assert_eq!(added, 2);
        assert!(ctx.store().get_by_symbol("AAPL").await.unwrap().is_some());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sweep_uses_shared_executor() {
        let (ctx, transport) = context();
        ctx.seed_watchlist(["IBM", "NVDA"]).await.unwrap();

        let result = ctx.run_synchronization_sweep().await;

        assert_eq!(result.status, SweepStatus::Completed);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        let usage = ctx.usage_snapshot();
        assert_eq!(usage.count, 2);
        assert_eq!(usage.remaining, 3);
        assert_eq!(ctx.circuit_state().state, CircuitState::Closed);
        let stock = ctx.store().get_by_symbol("IBM").await.unwrap().unwrap();
        assert_eq!(stock.current_price.map(|p| p.to_string()), Some("101.5000".to_string()));
    }

    #[test]
    fn test_shutdown_idempotent() {
        let (ctx, _) = context();
        assert!(!ctx.is_shut_down());
        ctx.shutdown();
        ctx.shutdown();
        assert!(ctx.is_shut_down());
        assert_eq!(ctx.provider_id(), "ALPHA_VANTAGE");
    }
}
