//! Stock domain model.

use chrono::{DateTime, Duration, Utc};
use rottenstocks_market_data::{CompanyOverview, StockQuote};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tracked stock and its most recent market data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    pub id: String,
    /// Normalized ticker (trimmed, upper-case)
    pub symbol: String,
    pub name: String,
    pub exchange: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub currency: Option<String>,
    pub market_cap: Option<Decimal>,

    pub current_price: Option<Decimal>,
    pub previous_close: Option<Decimal>,
    pub day_open: Option<Decimal>,
    pub day_high: Option<Decimal>,
    pub day_low: Option<Decimal>,
    pub change: Option<Decimal>,
    pub change_percent: Option<Decimal>,
    pub volume: Option<u64>,

    /// Inactive stocks are never selected for a sweep
    pub is_active: bool,
    /// Last successful quote refresh; `None` if never synced
    pub last_updated: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Stock {
    /// A new, never-synced stock. The name defaults to the symbol until an
    /// overview is fetched.
    pub fn new(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        Self {
            id: Uuid::new_v4().to_string(),
            name: symbol.clone(),
            symbol,
            exchange: None,
            sector: None,
            industry: None,
            description: None,
            currency: None,
            market_cap: None,
            current_price: None,
            previous_close: None,
            day_open: None,
            day_high: None,
            day_low: None,
            change: None,
            change_percent: None,
            volume: None,
            is_active: true,
            last_updated: None,
            created_at: Utc::now(),
        }
    }

    /// Copy price fields from a fresh quote and stamp `last_updated`.
    pub fn apply_quote(&mut self, quote: &StockQuote, at: DateTime<Utc>) {
        self.current_price = Some(quote.price);
        self.previous_close = quote.previous_close;
        self.day_open = quote.open;
        self.day_high = quote.high;
        self.day_low = quote.low;
        self.change = quote.change;
        self.change_percent = quote.change_percent;
        self.volume = quote.volume;
        self.last_updated = Some(at);
    }

    /// Copy descriptive fields from a company overview. Missing fields keep
    /// their previous values.
    pub fn apply_overview(&mut self, overview: &CompanyOverview) {
        self.name = overview.name.clone();
        if overview.exchange.is_some() {
            self.exchange = overview.exchange.clone();
        }
        if overview.sector.is_some() {
            self.sector = overview.sector.clone();
        }
        if overview.industry.is_some() {
            self.industry = overview.industry.clone();
        }
        if overview.description.is_some() {
            self.description = overview.description.clone();
        }
        if overview.currency.is_some() {
            self.currency = overview.currency.clone();
        }
        if overview.market_cap.is_some() {
            self.market_cap = overview.market_cap;
        }
    }

    /// Never synced, or last synced more than `max_age` ago.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.last_updated.map_or(true, |at| now - at > max_age)
    }
}
