//! Resilience configuration.
//!
//! [`ResilienceSettings`] is the flat option surface read from files or the
//! environment. [`MarketDataConfig::from_settings`] validates it and builds
//! the structured per-component configs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;
use crate::registry::{CircuitBreakerConfig, RateLimitConfig, RetryPolicy};

/// Default timeout for a single outbound call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Flat resilience options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResilienceSettings {
    pub requests_per_window: u32,
    pub burst_allowance: u32,
    pub window_size_seconds: u64,
    pub failure_threshold: u32,
    pub recovery_timeout_seconds: u64,
    pub max_attempts: u32,
    pub base_delay_seconds: f64,
    pub max_delay_seconds: f64,
    pub jitter_enabled: bool,
    pub daily_request_limit: u32,
    pub wait_ceiling_seconds: u64,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            requests_per_window: 5,
            burst_allowance: 0,
            window_size_seconds: 60,
            failure_threshold: 5,
            recovery_timeout_seconds: 60,
            max_attempts: 3,
            base_delay_seconds: 1.0,
            max_delay_seconds: 60.0,
            jitter_enabled: true,
            daily_request_limit: 25,
            wait_ceiling_seconds: 300,
        }
    }
}

/// Configuration for the resilient request path.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketDataConfig {
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
    /// Per-call transport timeout.
    pub request_timeout: Duration,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl MarketDataConfig {
    /// Build from the flat option surface.
    ///
    /// # Errors
    ///
    /// Returns [`MarketDataError::Configuration`] for values that would make
    /// a component unusable (empty window, zero threshold, negative delays).
    pub fn from_settings(settings: &ResilienceSettings) -> Result<Self, MarketDataError> {
        if settings.requests_per_window == 0 {
            return Err(invalid("requestsPerWindow must be at least 1"));
        }
        if settings
            .requests_per_window
            .checked_add(settings.burst_allowance)
            .is_none()
        {
            return Err(invalid(
                "requestsPerWindow plus burstAllowance is out of range",
            ));
        }
        if settings.window_size_seconds == 0 {
            return Err(invalid("windowSizeSeconds must be at least 1"));
        }
        if settings.failure_threshold == 0 {
            return Err(invalid("failureThreshold must be at least 1"));
        }
        let base_delay = seconds("baseDelaySeconds", settings.base_delay_seconds)?;
        let max_delay = seconds("maxDelaySeconds", settings.max_delay_seconds)?;
        if max_delay < base_delay {
            return Err(invalid("maxDelaySeconds must not be below baseDelaySeconds"));
        }

        Ok(Self {
            rate_limit: RateLimitConfig {
                requests_per_window: settings.requests_per_window,
                burst_allowance: settings.burst_allowance,
                window_size: Duration::from_secs(settings.window_size_seconds),
                wait_ceiling: Duration::from_secs(settings.wait_ceiling_seconds),
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: settings.failure_threshold,
                recovery_timeout: Duration::from_secs(settings.recovery_timeout_seconds),
                ..Default::default()
            },
            retry: RetryPolicy {
                max_attempts: settings.max_attempts,
                base_delay,
                max_delay,
                jitter: settings.jitter_enabled,
                ..Default::default()
            },
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Override the transport timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn invalid(message: &str) -> MarketDataError {
    MarketDataError::Configuration(message.to_string())
}

fn seconds(name: &str, value: f64) -> Result<Duration, MarketDataError> {
    if !value.is_finite() || value < 0.0 {
        return Err(MarketDataError::Configuration(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, value
        )));
    }
    Duration::try_from_secs_f64(value).map_err(|_| {
        MarketDataError::Configuration(format!("{} is out of range, got {}", name, value))
    })
}
