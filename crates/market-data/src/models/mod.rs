//! Market data models
//!
//! - `quote` - Latest stock quote (StockQuote)
//! - `profile` - Company fundamentals (CompanyOverview)
//! - `search` - Symbol search results (SearchResult)
//! - `symbol` - Ticker normalization

mod profile;
mod quote;
mod search;
mod symbol;

pub use profile::CompanyOverview;
pub use quote::StockQuote;
pub use search::SearchResult;
pub use symbol::{normalize_symbol, MAX_SYMBOL_LEN};
