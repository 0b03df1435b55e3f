//! Error types and failure classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all outbound provider calls
//! - [`ErrorKind`]: The tag that retry and circuit-breaker tables match on

mod kind;

pub use kind::ErrorKind;

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a market data provider.
///
/// The error is `Clone` so a single outcome can be handed to every caller
/// that was waiting on the same in-flight request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    /// The provider could not be reached or did not answer in time.
    #[error("Network failure: {provider} - {message}")]
    NetworkFailure {
        /// The provider that failed
        provider: String,
        /// Transport error description
        message: String,
        /// Whether the failure was a timeout
        timed_out: bool,
    },

    /// The provider rejected the request (4xx other than 429, or an
    /// embedded "Error Message" in a 200 payload).
    #[error("Client error: {provider} - {message}")]
    ClientError {
        /// The provider that rejected the request
        provider: String,
        /// HTTP status, if the rejection came from the transport layer
        status: Option<u16>,
        /// The error message from the provider
        message: String,
    },

    /// The provider (HTTP 429 or a throttling notice) or the local limiter
    /// refused the request.
    #[error("Rate limit exceeded: {provider} - {message}")]
    RateLimitExceeded {
        /// The provider that rate limited the request
        provider: String,
        /// Description of the limit that was hit
        message: String,
        /// How long the provider (or limiter) asked us to wait
        retry_after: Option<Duration>,
    },

    /// The provider answered with a 5xx status.
    #[error("Service unavailable: {provider} - {message}")]
    ServiceUnavailable {
        /// The provider that is unavailable
        provider: String,
        /// HTTP status code
        status: Option<u16>,
        /// The error message from the provider
        message: String,
    },

    /// The payload was malformed, empty, or did not match the request.
    #[error("Validation failed: {provider} - {message}")]
    ValidationFailed {
        /// The provider that returned the payload
        provider: String,
        /// Description of the validation failure
        message: String,
    },

    /// The circuit breaker is open for this provider.
    #[error("Circuit open: {provider} after {failure_count} failures")]
    CircuitOpen {
        /// The provider with an open circuit
        provider: String,
        /// Failures recorded when the call was rejected
        failure_count: u32,
    },

    /// The symbol was rejected before any network call.
    #[error("Invalid symbol: '{0}'")]
    InvalidSymbol(String),

    /// Invalid configuration or request construction.
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl MarketDataError {
    /// Returns the classification tag for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use rottenstocks_market_data::errors::{ErrorKind, MarketDataError};
    ///
    /// let error = MarketDataError::RateLimitExceeded {
    ///     provider: "ALPHA_VANTAGE".to_string(),
    ///     message: "HTTP 429".to_string(),
    ///     retry_after: None,
    /// };
    /// assert_eq!(error.kind(), ErrorKind::RateLimitExceeded);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NetworkFailure { .. } => ErrorKind::NetworkFailure,
            Self::ClientError { .. } | Self::InvalidSymbol(_) => ErrorKind::ClientError,
            Self::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            Self::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            Self::ValidationFailed { .. } => ErrorKind::ValidationFailure,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// The provider the error originated from, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::NetworkFailure { provider, .. }
            | Self::ClientError { provider, .. }
            | Self::RateLimitExceeded { provider, .. }
            | Self::ServiceUnavailable { provider, .. }
            | Self::ValidationFailed { provider, .. }
            | Self::CircuitOpen { provider, .. } => Some(provider),
            Self::InvalidSymbol(_) | Self::Configuration(_) => None,
        }
    }

    /// Provider-supplied (or limiter-computed) retry hint.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub(crate) fn validation(provider: &str, message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}
