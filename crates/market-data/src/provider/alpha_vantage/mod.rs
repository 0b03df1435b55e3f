//! Alpha Vantage market data provider implementation.
//!
//! This module provides stock data from the Alpha Vantage API:
//! - Latest quotes via the GLOBAL_QUOTE function
//! - Company fundamentals via the OVERVIEW function
//! - Symbol lookup via the SYMBOL_SEARCH function
//!
//! Note: Alpha Vantage free tier is limited to 5 API calls per minute and
//! 25 per day, and reports throttling inside HTTP 200 bodies.

mod models;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;

use crate::errors::MarketDataError;
use crate::models::{normalize_symbol, CompanyOverview, SearchResult, StockQuote};
use crate::provider::{
    MarketDataProvider, ProviderRequest, ProviderTransport, RawResponse, TransportFailure,
};
use crate::registry::ResilientExecutor;

const BASE_URL: &str = "https://www.alphavantage.co/query";
pub const PROVIDER_ID: &str = "ALPHA_VANTAGE";

/// Header carrying the per-call correlation id.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

// ============================================================================
// Transport
// ============================================================================

/// HTTP transport for the Alpha Vantage query endpoint.
pub struct AlphaVantageTransport {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageTransport {
    /// Create a transport with the given API key and per-call timeout.
    pub fn new(api_key: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the transport at a different endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_url(&self, request: &ProviderRequest) -> Result<reqwest::Url, TransportFailure> {
        let mut params: Vec<(&str, &str)> = Vec::with_capacity(request.params.len() + 2);
        params.push(("function", request.function));
        params.extend(request.params.iter().map(|(k, v)| (*k, v.as_str())));
        params.push(("apikey", self.api_key.as_str()));

        reqwest::Url::parse_with_params(&self.base_url, &params)
            .map_err(|e| TransportFailure::other(format!("Failed to build URL: {}", e)))
    }

    fn redact(&self, text: &str) -> String {
        if self.api_key.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.api_key, "***")
        }
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[async_trait]
impl ProviderTransport for AlphaVantageTransport {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn send(
        &self,
        request: &ProviderRequest,
        correlation_id: &str,
    ) -> Result<RawResponse, TransportFailure> {
        let url = self.build_url(request)?;
        debug!(
            "Alpha Vantage request [{}]: {}",
            correlation_id,
            self.redact(url.as_str())
        );

        let response = self
            .client
            .get(url)
            .header(CORRELATION_HEADER, correlation_id)
            .send()
            .await
            .map_err(|e| {
                let message = self.redact(&e.to_string());
                if e.is_timeout() {
                    TransportFailure::timeout(message)
                } else if e.is_connect() {
                    TransportFailure::connect(message)
                } else {
                    TransportFailure::other(message)
                }
            })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        let body = response.text().await.map_err(|e| {
            let message = self.redact(&e.to_string());
            if e.is_timeout() {
                TransportFailure::timeout(message)
            } else {
                TransportFailure::other(message)
            }
        })?;

        Ok(RawResponse {
            status,
            body,
            retry_after,
        })
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Alpha Vantage market data provider.
///
/// Every call runs through the shared [`ResilientExecutor`].
pub struct AlphaVantageProvider {
    executor: Arc<ResilientExecutor>,
    transport: Arc<dyn ProviderTransport>,
}

impl AlphaVantageProvider {
    /// Create a provider talking HTTP to Alpha Vantage.
    pub fn new(api_key: String, timeout: Duration, executor: Arc<ResilientExecutor>) -> Self {
        Self::with_transport(
            Arc::new(AlphaVantageTransport::new(api_key, timeout)),
            executor,
        )
    }

    /// Create a provider over an arbitrary transport.
    pub fn with_transport(
        transport: Arc<dyn ProviderTransport>,
        executor: Arc<ResilientExecutor>,
    ) -> Self {
        Self {
            executor,
            transport,
        }
    }

    /// The executor shared by this provider.
    pub fn executor(&self) -> &Arc<ResilientExecutor> {
        &self.executor
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageProvider {
    fn id(&self) -> &'static str {
        self.transport.provider_id()
    }

    async fn get_quote(&self, symbol: &str) -> Result<StockQuote, MarketDataError> {
        let symbol = normalize_symbol(symbol)?;
        let request = ProviderRequest::new("GLOBAL_QUOTE").param("symbol", symbol.as_str());
        self.executor
            .execute(self.transport.as_ref(), &request, |body| {
                models::parse_quote(body, &symbol)
            })
            .await
    }

    async fn get_company_overview(&self, symbol: &str) -> Result<CompanyOverview, MarketDataError> {
        let symbol = normalize_symbol(symbol)?;
        let request = ProviderRequest::new("OVERVIEW").param("symbol", symbol.as_str());
        self.executor
            .execute(self.transport.as_ref(), &request, |body| {
                models::parse_overview(body, &symbol)
            })
            .await
    }

    async fn search_symbols(&self, keywords: &str) -> Result<Vec<SearchResult>, MarketDataError> {
        let keywords = keywords.trim();
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let request = ProviderRequest::new("SYMBOL_SEARCH").param("keywords", keywords);
        self.executor
            .execute(self.transport.as_ref(), &request, models::parse_search)
            .await
    }
}
