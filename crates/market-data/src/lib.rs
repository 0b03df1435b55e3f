//! RottenStocks Market Data Crate
//!
//! Quota-aware, fault-tolerant access to a rate-limited stock data provider.
//!
//! # Overview
//!
//! Every outbound call passes through the [`ResilientExecutor`], which
//! composes three guards:
//!
//! - [`RateLimiter`] - sliding-window request quota per provider
//! - [`CircuitBreaker`] - stops calling a provider that keeps failing
//! - [`RetryPolicy`] - exponential backoff with jitter for transient failures
//!
//! # Architecture
//!
//! ```text
//! +----------------------+
//! | MarketDataProvider   |  (get_quote, get_company_overview, search_symbols)
//! +----------------------+
//!            |
//!            v
//! +----------------------+
//! | ResilientExecutor    |  breaker -> limiter -> transport -> classify
//! +----------------------+
//!            |
//!            v
//! +----------------------+
//! | ProviderTransport    |  (Alpha Vantage over HTTP)
//! +----------------------+
//! ```
//!
//! Failures are tagged with an [`ErrorKind`] so that retry and breaker
//! decisions are plain table lookups.

pub mod config;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;

pub use config::{MarketDataConfig, ResilienceSettings};
pub use errors::{ErrorKind, MarketDataError};

pub use models::{normalize_symbol, CompanyOverview, SearchResult, StockQuote};

pub use provider::alpha_vantage::{AlphaVantageProvider, AlphaVantageTransport};
pub use provider::{MarketDataProvider, ProviderRequest, ProviderTransport, RawResponse};

pub use registry::{
    CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitPermit, CircuitSnapshot, CircuitState,
    RateLimitConfig, RateLimitUsage, RateLimiter, ResilientExecutor, RetryPolicy,
};
