use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Company fundamentals from a provider's overview endpoint
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyOverview {
    /// Ticker the overview belongs to
    pub symbol: String,

    /// Company name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Listing exchange (e.g., "NASDAQ")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Business sector (e.g., "TECHNOLOGY")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,

    /// Industry within sector
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,

    /// Normalized asset type (e.g., "EQUITY", "ETF")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe_ratio: Option<Decimal>,

    /// Dividend yield (as decimal, e.g., 0.025 for 2.5%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dividend_yield: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_52_high: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub week_52_low: Option<Decimal>,
}
