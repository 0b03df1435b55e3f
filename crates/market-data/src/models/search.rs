//! Symbol search results.

use serde::{Deserialize, Serialize};

/// Result from a ticker/symbol search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Symbol/ticker (e.g., "AAPL", "SHOP.TRT")
    pub symbol: String,

    /// Company name (e.g., "Apple Inc")
    pub name: String,

    /// Asset type (e.g., "Equity", "ETF")
    pub asset_type: String,

    /// Market region (e.g., "United States")
    pub region: String,

    /// Trading currency (e.g., "USD")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Relevance score from provider (higher = better match)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
}

impl SearchResult {
    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        asset_type: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            asset_type: asset_type.into(),
            region: region.into(),
            currency: None,
            match_score: None,
        }
    }

    /// Set the currency.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Set the relevance score.
    pub fn with_match_score(mut self, score: f64) -> Self {
        self.match_score = Some(score);
        self
    }
}
