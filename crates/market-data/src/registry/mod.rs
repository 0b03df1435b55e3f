//! Resilience layer for outbound provider calls.
//!
//! This module provides:
//! - Sliding-window rate limiting per provider and identifier
//! - Circuit breaking for fault tolerance
//! - Retry with exponential backoff
//! - The executor composing all three around a transport

mod circuit_breaker;
mod executor;
mod rate_limiter;
mod retry_policy;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitPermit, CircuitSnapshot,
    CircuitState,
};
pub use executor::ResilientExecutor;
pub use rate_limiter::{RateLimitConfig, RateLimitUsage, RateLimiter, DEFAULT_IDENTIFIER};
pub use retry_policy::{RetryContext, RetryDecision, RetryPolicy};
