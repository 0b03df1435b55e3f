use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest quote for a listed stock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockQuote {
    /// Ticker as echoed back by the provider
    pub symbol: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,

    /// Last traded price (required)
    pub price: Decimal,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,

    /// Trading day the quote belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_trading_day: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<Decimal>,

    /// Change in percent (e.g. `1.25` for +1.25%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<Decimal>,

    /// When we received the quote
    pub fetched_at: DateTime<Utc>,

    /// Provider that supplied the quote (ALPHA_VANTAGE, etc.)
    pub source: String,
}

impl StockQuote {
    /// Create a quote with only the required fields.
    pub fn new(symbol: impl Into<String>, price: Decimal, source: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            open: None,
            high: None,
            low: None,
            price,
            volume: None,
            latest_trading_day: None,
            previous_close: None,
            change: None,
            change_percent: None,
            fetched_at: Utc::now(),
            source: source.into(),
        }
    }
}
