//! Alpha Vantage response payloads and their conversion into domain models.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::PROVIDER_ID;
use crate::errors::MarketDataError;
use crate::models::{CompanyOverview, SearchResult, StockQuote};

// ============================================================================
// GLOBAL_QUOTE
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    pub global_quote: Option<GlobalQuote>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    pub symbol: Option<String>,
    #[serde(rename = "02. open")]
    pub open: Option<String>,
    #[serde(rename = "03. high")]
    pub high: Option<String>,
    #[serde(rename = "04. low")]
    pub low: Option<String>,
    #[serde(rename = "05. price")]
    pub price: Option<String>,
    #[serde(rename = "06. volume")]
    pub volume: Option<String>,
    #[serde(rename = "07. latest trading day")]
    pub latest_trading_day: Option<String>,
    #[serde(rename = "08. previous close")]
    pub previous_close: Option<String>,
    #[serde(rename = "09. change")]
    pub change: Option<String>,
    #[serde(rename = "10. change percent")]
    pub change_percent: Option<String>,
}

// ============================================================================
// OVERVIEW
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OverviewResponse {
    #[serde(rename = "Symbol")]
    pub symbol: Option<String>,
    #[serde(rename = "AssetType")]
    pub asset_type: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "Exchange")]
    pub exchange: Option<String>,
    #[serde(rename = "Currency")]
    pub currency: Option<String>,
    #[serde(rename = "Country")]
    pub country: Option<String>,
    #[serde(rename = "Sector")]
    pub sector: Option<String>,
    #[serde(rename = "Industry")]
    pub industry: Option<String>,
    #[serde(rename = "MarketCapitalization")]
    pub market_capitalization: Option<String>,
    #[serde(rename = "PERatio")]
    pub pe_ratio: Option<String>,
    #[serde(rename = "DividendYield")]
    pub dividend_yield: Option<String>,
    #[serde(rename = "52WeekHigh")]
    pub week_52_high: Option<String>,
    #[serde(rename = "52WeekLow")]
    pub week_52_low: Option<String>,
}

// ============================================================================
// SYMBOL_SEARCH
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(rename = "bestMatches")]
    pub best_matches: Option<Vec<SearchMatch>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchMatch {
    #[serde(rename = "1. symbol")]
    pub symbol: String,
    #[serde(rename = "2. name")]
    pub name: String,
    #[serde(rename = "3. type")]
    pub asset_type: String,
    #[serde(rename = "4. region")]
    pub region: String,
    #[serde(rename = "8. currency")]
    pub currency: Option<String>,
    #[serde(rename = "9. matchScore")]
    pub match_score: Option<String>,
}

// ============================================================================
// Conversions
// ============================================================================

/// Alpha Vantage uses "None", "-" and "" for missing values.
fn parse_decimal(s: &Option<String>) -> Option<Decimal> {
    s.as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "None" && *v != "-")
        .and_then(|v| Decimal::from_str(v).ok())
}

fn non_empty(s: &Option<String>) -> Option<String> {
    s.as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "None")
        .map(str::to_string)
}

fn decode<T: serde::de::DeserializeOwned>(body: &Value, what: &str) -> Result<T, MarketDataError> {
    T::deserialize(body).map_err(|e| {
        MarketDataError::validation(PROVIDER_ID, format!("Malformed {} response: {}", what, e))
    })
}

/// Parse a classified GLOBAL_QUOTE body.
pub(crate) fn parse_quote(body: &Value, requested: &str) -> Result<StockQuote, MarketDataError> {
    let response: GlobalQuoteResponse = decode(body, "GLOBAL_QUOTE")?;
    let quote = response
        .global_quote
        .filter(|q| q.symbol.is_some() || q.price.is_some())
        .ok_or_else(|| {
            MarketDataError::validation(PROVIDER_ID, format!("Empty quote for '{}'", requested))
        })?;

    let price = parse_decimal(&quote.price)
        .filter(|p| *p > Decimal::ZERO)
        .ok_or_else(|| {
            MarketDataError::validation(
                PROVIDER_ID,
                format!("Missing or non-positive price for '{}'", requested),
            )
        })?;

    let symbol = non_empty(&quote.symbol).unwrap_or_else(|| requested.to_string());
    let mut result = StockQuote::new(symbol, price, PROVIDER_ID);
    result.open = parse_decimal(&quote.open);
    result.high = parse_decimal(&quote.high);
    result.low = parse_decimal(&quote.low);
    result.volume = quote
        .volume
        .as_deref()
        .and_then(|v| v.trim().parse::<u64>().ok());
    result.latest_trading_day = quote
        .latest_trading_day
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok());
    result.previous_close = parse_decimal(&quote.previous_close);
    result.change = parse_decimal(&quote.change);
    result.change_percent = quote
        .change_percent
        .as_deref()
        .map(|p| p.trim().trim_end_matches('%').to_string())
        .and_then(|p| Decimal::from_str(&p).ok());
    Ok(result)
}

/// Parse a classified OVERVIEW body, checking it belongs to `requested`.
pub(crate) fn parse_overview(
    body: &Value,
    requested: &str,
) -> Result<CompanyOverview, MarketDataError> {
    let overview: OverviewResponse = decode(body, "OVERVIEW")?;

    let symbol = non_empty(&overview.symbol).ok_or_else(|| {
        MarketDataError::validation(PROVIDER_ID, format!("Empty overview for '{}'", requested))
    })?;
    if !symbol.eq_ignore_ascii_case(requested) {
        return Err(MarketDataError::validation(
            PROVIDER_ID,
            format!(
                "Overview symbol mismatch: requested '{}', got '{}'",
                requested, symbol
            ),
        ));
    }

    // Alpha Vantage returns "Common Stock", "ETF", "Mutual Fund", etc.
    let asset_type = non_empty(&overview.asset_type).map(|t| match t.to_uppercase().as_str() {
        "COMMON STOCK" => "EQUITY".to_string(),
        "MUTUAL FUND" => "MUTUALFUND".to_string(),
        other => other.to_string(),
    });

    Ok(CompanyOverview {
        name: non_empty(&overview.name).unwrap_or_else(|| symbol.clone()),
        symbol,
        description: non_empty(&overview.description),
        exchange: non_empty(&overview.exchange),
        currency: non_empty(&overview.currency),
        country: non_empty(&overview.country),
        sector: non_empty(&overview.sector),
        industry: non_empty(&overview.industry),
        asset_type,
        market_cap: parse_decimal(&overview.market_capitalization),
        pe_ratio: parse_decimal(&overview.pe_ratio),
        dividend_yield: parse_decimal(&overview.dividend_yield),
        week_52_high: parse_decimal(&overview.week_52_high),
        week_52_low: parse_decimal(&overview.week_52_low),
    })
}

/// Parse a classified SYMBOL_SEARCH body.
pub(crate) fn parse_search(body: &Value) -> Result<Vec<SearchResult>, MarketDataError> {
    let response: SearchResponse = decode(body, "SYMBOL_SEARCH")?;
    let matches = response.best_matches.ok_or_else(|| {
        MarketDataError::validation(PROVIDER_ID, "Search response has no bestMatches")
    })?;

    Ok(matches
        .into_iter()
        .map(|m| {
            let mut result = SearchResult::new(m.symbol, m.name, m.asset_type, m.region);
            if let Some(currency) = m.currency.filter(|c| !c.is_empty()) {
                result = result.with_currency(currency);
            }
            if let Some(score) = m.match_score.and_then(|s| s.parse::<f64>().ok()) {
                result = result.with_match_score(score);
            }
            result
        })
        .collect())
}
