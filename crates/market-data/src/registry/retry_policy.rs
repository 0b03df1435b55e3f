//! Retry policy with exponential backoff.
//!
//! Decisions are table lookups on [`ErrorKind`]: a failure is retried only if
//! its kind is in `retry_on`, is never retried if it is in `stop_on`, and
//! anything unclassified propagates immediately.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::errors::{ErrorKind, MarketDataError};

/// Fraction of the computed delay used as the jitter band.
const JITTER_FRACTION: f64 = 0.1;

/// Outcome of consulting the policy after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then try again.
    Retry(Duration),
    /// Give up and hand the error to the caller.
    Stop,
}

/// Retry configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = `max_attempts + 1`).
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Perturb delays by up to ±10%.
    pub jitter: bool,
    /// Kinds that may be retried.
    pub retry_on: Vec<ErrorKind>,
    /// Kinds that stop retrying immediately, even if listed in `retry_on`.
    pub stop_on: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
            retry_on: vec![
                ErrorKind::NetworkFailure,
                ErrorKind::ServiceUnavailable,
                ErrorKind::RateLimitExceeded,
            ],
            stop_on: vec![ErrorKind::CircuitOpen],
        }
    }
}

impl RetryPolicy {
    /// Few, slow retries.
    pub fn conservative() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// Many, quick retries.
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            ..Default::default()
        }
    }

    /// Long waits, retrying only throttling and outages.
    pub fn rate_limited() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            retry_on: vec![ErrorKind::RateLimitExceeded, ErrorKind::ServiceUnavailable],
            ..Default::default()
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Backoff delay for a 0-based attempt:
    /// `min(base_delay * exponential_base^attempt, max_delay)`, ±10% when
    /// jitter is enabled.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.base_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let mut delay = raw.min(self.max_delay.as_secs_f64());

        if self.jitter {
            let band = delay * JITTER_FRACTION;
            if band > 0.0 {
                delay += rand::thread_rng().gen_range(-band..=band);
            }
        }

        if delay > 0.0 {
            Duration::try_from_secs_f64(delay).unwrap_or(self.max_delay)
        } else {
            Duration::ZERO
        }
    }

    /// Whether a failure on the given 0-based attempt should be retried.
    pub fn should_retry(&self, error: &MarketDataError, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        let kind = error.kind();
        if self.stop_on.contains(&kind) {
            return false;
        }
        self.retry_on.contains(&kind)
    }

    /// Full decision, including the delay to sleep before the next attempt.
    ///
    /// A rate-limit failure carrying a retry hint waits at least that long.
    pub fn decide(&self, error: &MarketDataError, attempt: u32) -> RetryDecision {
        if !self.should_retry(error, attempt) {
            return RetryDecision::Stop;
        }

        let computed = self.calculate_delay(attempt);
        let delay = match error.retry_after() {
            Some(hint) if error.kind() == ErrorKind::RateLimitExceeded => computed.max(hint),
            _ => computed,
        };
        RetryDecision::Retry(delay)
    }
}

/// Per-call retry bookkeeping.
///
/// Lives only for the duration of one logical request.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryContext {
    /// 0-based attempt currently in progress.
    pub attempt: u32,
    /// Retries permitted after the first attempt.
    pub max_attempts: u32,
    /// Delay slept before the current attempt, if any.
    pub delay: Option<Duration>,
}

impl RetryContext {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            delay: None,
        }
    }

    /// Advance to the next attempt after sleeping `delay`.
    pub fn advance(&mut self, delay: Duration) {
        self.attempt += 1;
        self.delay = Some(delay);
    }

    /// Total attempts this call may make.
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts + 1
    }
}
