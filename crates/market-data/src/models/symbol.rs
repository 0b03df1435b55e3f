use crate::errors::MarketDataError;

/// Longest ticker accepted.
pub const MAX_SYMBOL_LEN: usize = 10;

/// Trim and upper-case a ticker, rejecting empty or overlong input.
///
/// ```
/// use rottenstocks_market_data::models::normalize_symbol;
///
/// assert_eq!(normalize_symbol(" aapl ").unwrap(), "AAPL");
/// assert!(normalize_symbol("   ").is_err());
/// ```
pub fn normalize_symbol(symbol: &str) -> Result<String, MarketDataError> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_SYMBOL_LEN {
        return Err(MarketDataError::InvalidSymbol(symbol.to_string()));
    }
    Ok(trimmed.to_uppercase())
}
