//! Core error types for the RottenStocks sync layer.
//!
//! Storage-specific errors are converted to strings by the storage layer so
//! this type stays backend-agnostic.

use rottenstocks_market_data::{ErrorKind, MarketDataError};
use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the sync layer.
///
/// `Clone` so one in-flight sync outcome can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Market data operation failed: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Stock not found: {0}")]
    NotFound(String),

    #[error("Daily request budget exhausted ({used}/{limit})")]
    BudgetExhausted { used: u32, limit: u32 },

    #[error("In-flight sync for {0} ended without a result")]
    SyncAbandoned(String),

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),
}

impl Error {
    /// Taxonomy tag of the underlying provider failure, if any.
    pub fn market_data_kind(&self) -> Option<ErrorKind> {
        match self {
            Error::MarketData(e) => Some(e.kind()),
            _ => None,
        }
    }
}
