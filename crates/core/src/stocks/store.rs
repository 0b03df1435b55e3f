//! Stock storage traits.
//!
//! The orchestrator only depends on [`StockStore`]; persistence backends
//! implement it. [`InMemoryStockStore`] is the single-process backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::model::Stock;
use crate::errors::Result;

/// Storage interface for tracked stocks.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// All stocks, active or not.
    async fn list(&self) -> Result<Vec<Stock>>;

    /// Stocks eligible for synchronization.
    async fn list_active(&self) -> Result<Vec<Stock>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|s| s.is_active)
            .collect())
    }

    /// Look up a stock by its normalized symbol.
    async fn get_by_symbol(&self, symbol: &str) -> Result<Option<Stock>>;

    /// Insert or replace a stock, keyed by symbol.
    async fn upsert(&self, stock: &Stock) -> Result<Stock>;
}

/// In-memory stock store keyed by symbol.
#[derive(Default)]
pub struct InMemoryStockStore {
    stocks: RwLock<HashMap<String, Stock>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with never-synced stocks.
    pub fn with_stocks(stocks: impl IntoIterator<Item = Stock>) -> Self {
        Self {
            stocks: RwLock::new(stocks.into_iter().map(|s| (s.symbol.clone(), s)).collect()),
        }
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn list(&self) -> Result<Vec<Stock>> {
        let mut stocks: Vec<Stock> = self.stocks.read().await.values().cloned().collect();
        stocks.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(stocks)
    }

    async fn get_by_symbol(&self, symbol: &str) -> Result<Option<Stock>> {
        Ok(self.stocks.read().await.get(symbol).cloned())
    }

    async fn upsert(&self, stock: &Stock) -> Result<Stock> {
        self.stocks
            .write()
            .await
            .insert(stock.symbol.clone(), stock.clone());
        Ok(stock.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_and_lookup() {
        let store = InMemoryStockStore::new();
        let stock = Stock::new("AAPL");

        store.upsert(&stock).await.unwrap();

        let found = store.get_by_symbol("AAPL").await.unwrap().unwrap();
        assert_eq!(found.id, stock.id);
        assert!(store.get_by_symbol("MSFT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_active_filters_inactive() {
        let mut inactive = Stock::new("GME");
        inactive.is_active = false;
        let store = InMemoryStockStore::with_stocks(vec![Stock::new("AAPL"), inactive]);

        assert_eq!(store.list().await.unwrap().len(), 2);
        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].symbol, "AAPL");
    }
}
