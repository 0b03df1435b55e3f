//! Resilient request executor.
//!
//! Every outbound provider call goes through [`ResilientExecutor::execute`],
//! which composes the circuit breaker, the rate limiter and the retry policy
//! around a single [`ProviderTransport`]. Per attempt:
//!
//! 1. Ask the breaker for admission; a rejection is a `CircuitOpen` failure
//!    and consumes no rate-limit slot.
//! 2. Wait for a rate-limit slot.
//! 3. Send the request, tagged with a correlation id shared by all attempts.
//! 4. Classify the response and parse the success payload.
//! 5. Report the outcome to the breaker.
//! 6. Consult the retry policy, sleep, and loop or return.

use log::{debug, error, info, warn};
use serde_json::Value;
use uuid::Uuid;

use super::circuit_breaker::{CircuitBreaker, CircuitMetrics, CircuitSnapshot};
use super::rate_limiter::{RateLimitUsage, RateLimiter, DEFAULT_IDENTIFIER};
use super::retry_policy::{RetryContext, RetryDecision, RetryPolicy};
use crate::config::MarketDataConfig;
use crate::errors::MarketDataError;
use crate::provider::{ProviderRequest, ProviderTransport, ResponseClassifier};

/// Composes breaker, limiter and retry policy around provider calls.
///
/// One executor is shared by every caller in the process so that all of them
/// see the same windows and circuits.
pub struct ResilientExecutor {
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    retry_policy: RetryPolicy,
    classifier: ResponseClassifier,
}

impl ResilientExecutor {
    /// Build an executor from configuration.
    pub fn new(config: &MarketDataConfig) -> Self {
        Self::with_components(
            RateLimiter::with_default_config(config.rate_limit.clone()),
            CircuitBreaker::with_config(config.circuit_breaker.clone()),
            config.retry.clone(),
        )
    }

    /// Build an executor from already constructed components.
    pub fn with_components(
        rate_limiter: RateLimiter,
        circuit_breaker: CircuitBreaker,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            rate_limiter,
            circuit_breaker,
            retry_policy,
            classifier: ResponseClassifier::default(),
        }
    }

    /// Replace the response classifier.
    pub fn with_classifier(mut self, classifier: ResponseClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Execute a request with retries, returning the parsed payload.
    ///
    /// `parse` turns a classified success body into the caller's type; a
    /// parse error counts as a failed attempt with the error's own kind.
    ///
    /// # Errors
    ///
    /// Non-retryable failures are returned immediately. Retryable ones are
    /// returned only once the policy's attempts are exhausted.
    pub async fn execute<T, F>(
        &self,
        transport: &dyn ProviderTransport,
        request: &ProviderRequest,
        parse: F,
    ) -> Result<T, MarketDataError>
    where
        F: Fn(&Value) -> Result<T, MarketDataError>,
    {
        let provider = transport.provider_id();
        let correlation_id = Uuid::new_v4().to_string();
        let mut ctx = RetryContext::new(self.retry_policy.max_attempts);

        loop {
            let attempt = ctx.attempt + 1;
            debug!(
                "{} {} attempt {}/{} [{}]",
                provider,
                request.function,
                attempt,
                ctx.total_attempts(),
                correlation_id
            );

            let error = match self
                .attempt(transport, request, &correlation_id, &parse)
                .await
            {
                Ok(value) => {
                    if ctx.attempt > 0 {
                        info!(
                            "{} {} succeeded on attempt {} [{}]",
                            provider, request.function, attempt, correlation_id
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            match self.retry_policy.decide(&error, ctx.attempt) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        "{} {} attempt {}/{} failed ({}) [{}]: {}. Retrying in {:.2}s",
                        provider,
                        request.function,
                        attempt,
                        ctx.total_attempts(),
                        error.kind(),
                        correlation_id,
                        error,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    ctx.advance(delay);
                }
                RetryDecision::Stop => {
                    error!(
                        "{} {} failed on attempt {}/{} ({}) [{}]: {}",
                        provider,
                        request.function,
                        attempt,
                        ctx.total_attempts(),
                        error.kind(),
                        correlation_id,
                        error
                    );
                    return Err(error);
                }
            }
        }
    }

    /// One pass through breaker, limiter, transport and classifier.
    async fn attempt<T, F>(
        &self,
        transport: &dyn ProviderTransport,
        request: &ProviderRequest,
        correlation_id: &str,
        parse: &F,
    ) -> Result<T, MarketDataError>
    where
        F: Fn(&Value) -> Result<T, MarketDataError>,
    {
        let provider = transport.provider_id();

        let Some(permit) = self.circuit_breaker.acquire(provider) else {
            return Err(MarketDataError::CircuitOpen {
                provider: provider.to_string(),
                failure_count: self.circuit_breaker.failure_count(provider),
            });
        };

        // Dropping the unsettled permit gives back a half-open probe slot,
        // both here and if this future is cancelled mid-call.
        self.rate_limiter
            .wait_if_needed(provider, DEFAULT_IDENTIFIER)
            .await?;

        let result = match transport.send(request, correlation_id).await {
            Ok(response) => self
                .classifier
                .classify(provider, &response)
                .and_then(|body| parse(&body)),
            Err(failure) => Err(failure.into_error(provider)),
        };

        match &result {
            Ok(_) => permit.success(),
            Err(e) => permit.failure(e.kind()),
        }

        result
    }

    /// Current rate-limit window usage for a provider.
    pub fn usage_snapshot(&self, provider: &str) -> RateLimitUsage {
        self.rate_limiter.usage(provider, DEFAULT_IDENTIFIER)
    }

    /// Current circuit state for a provider.
    pub fn circuit_state(&self, provider: &str) -> CircuitSnapshot {
        self.circuit_breaker.snapshot(provider)
    }

    /// Metrics for every circuit seen so far.
    pub fn circuit_metrics(&self) -> Vec<CircuitMetrics> {
        self.circuit_breaker.metrics()
    }

    /// Manually close a provider's circuit.
    pub fn reset_circuit(&self, provider: &str) {
        self.circuit_breaker.reset(provider);
    }

    /// Clear a provider's rate-limit window.
    pub fn reset_rate_limit(&self, provider: &str) {
        self.rate_limiter.reset(provider, DEFAULT_IDENTIFIER);
    }
}
