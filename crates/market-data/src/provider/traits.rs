//! Provider trait definitions.
//!
//! Two seams are defined here:
//!
//! - [`ProviderTransport`]: one raw outbound call. Implementations do no
//!   retrying, throttling or classification; they return the status and body
//!   exactly as received, or a transport failure.
//! - [`MarketDataProvider`]: the typed capability surface (quote, company
//!   overview, search) consumed by the synchronization layer.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{CompanyOverview, SearchResult, StockQuote};

/// A single provider request, e.g. `function=GLOBAL_QUOTE&symbol=AAPL`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderRequest {
    /// Provider function / endpoint name.
    pub function: &'static str,
    /// Query parameters, excluding credentials.
    pub params: Vec<(&'static str, String)>,
}

impl ProviderRequest {
    pub fn new(function: &'static str) -> Self {
        Self {
            function,
            params: Vec::new(),
        }
    }

    /// Add a query parameter.
    pub fn param(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.params.push((key, value.into()));
        self
    }

    /// Look up a query parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Response as received from the wire, before any classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
    /// Parsed `Retry-After` header, if present.
    pub retry_after: Option<Duration>,
}

impl RawResponse {
    /// A 200 response with the given body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            retry_after: None,
        }
    }

    /// A response with an arbitrary status.
    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }
}

/// Kind of transport-level failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportFailureKind {
    Timeout,
    Connect,
    Other,
}

/// A call that never produced an HTTP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: TransportFailureKind,
    pub message: String,
}

impl TransportFailure {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: TransportFailureKind::Timeout,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self {
            kind: TransportFailureKind::Connect,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: TransportFailureKind::Other,
            message: message.into(),
        }
    }

    /// Every transport failure is a network failure in the error taxonomy.
    pub fn into_error(self, provider: &str) -> MarketDataError {
        MarketDataError::NetworkFailure {
            provider: provider.to_string(),
            timed_out: self.kind == TransportFailureKind::Timeout,
            message: self.message,
        }
    }
}

/// Raw outbound call to a provider.
///
/// The correlation id must be attached to the outgoing request (for example
/// as a header) so provider-side logs can be matched with ours.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    /// Unique identifier for the provider, e.g. "ALPHA_VANTAGE".
    ///
    /// Used as the key for rate limiting and circuit breaking.
    fn provider_id(&self) -> &'static str;

    /// Issue one request.
    async fn send(
        &self,
        request: &ProviderRequest,
        correlation_id: &str,
    ) -> Result<RawResponse, TransportFailure>;
}

/// Typed market data capabilities.
///
/// Every call goes through the resilience layer: rate limiting, circuit
/// breaking, retries and response classification.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Unique identifier for this provider.
    fn id(&self) -> &'static str;

    /// Fetch the latest quote for a symbol.
    async fn get_quote(&self, symbol: &str) -> Result<StockQuote, MarketDataError>;

    /// Fetch company fundamentals for a symbol.
    async fn get_company_overview(&self, symbol: &str) -> Result<CompanyOverview, MarketDataError>;

    /// Search for symbols matching the keywords.
    async fn search_symbols(&self, keywords: &str) -> Result<Vec<SearchResult>, MarketDataError>;
}
