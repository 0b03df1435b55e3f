//! Sliding window rate limiter for market data providers.
//!
//! Every (provider, identifier) pair owns a window of request timestamps.
//! On each check, timestamps older than `window_size` are pruned, the rest are
//! counted, and the request is admitted only if the count is below
//! `requests_per_window + burst_allowance`. Prune, count and insert happen
//! under one lock acquisition, so concurrent callers can never over-admit.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::errors::MarketDataError;

/// Identifier used when callers don't partition a provider's quota further.
pub const DEFAULT_IDENTIFIER: &str = "default";

/// Alpha Vantage free tier: 5 requests per minute.
const DEFAULT_REQUESTS_PER_WINDOW: u32 = 5;

const DEFAULT_WINDOW_SIZE: Duration = Duration::from_secs(60);

/// Never park a caller longer than this; fail with a retry hint instead.
const DEFAULT_WAIT_CEILING: Duration = Duration::from_secs(300);

/// Rate limiter configuration for a provider.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitConfig {
    /// Requests admitted per window.
    pub requests_per_window: u32,
    /// Extra requests admitted on top of `requests_per_window`.
    pub burst_allowance: u32,
    /// Length of the trailing window.
    pub window_size: Duration,
    /// Longest wait `wait_if_needed` will sleep through.
    pub wait_ceiling: Duration,
}

impl RateLimitConfig {
    /// Maximum requests admitted within one window.
    pub fn max_requests(&self) -> usize {
        self.requests_per_window.saturating_add(self.burst_allowance) as usize
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: DEFAULT_REQUESTS_PER_WINDOW,
            burst_allowance: 0,
            window_size: DEFAULT_WINDOW_SIZE,
            wait_ceiling: DEFAULT_WAIT_CEILING,
        }
    }
}

/// Usage snapshot for one (provider, identifier) window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitUsage {
    /// Requests counted in the current window.
    pub count: usize,
    /// Maximum requests per window (including burst).
    pub max: usize,
    /// Requests still admissible right now.
    pub remaining: usize,
    /// Time until a slot frees up, when the window is full.
    pub reset_eta: Option<Duration>,
}

/// Timestamps of admitted requests, oldest first.
#[derive(Debug, Default)]
struct RateWindow {
    timestamps: VecDeque<Instant>,
}

impl RateWindow {
    /// Drop every timestamp that has aged out of the window.
    fn prune(&mut self, now: Instant, window_size: Duration) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= window_size {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until the oldest in-window timestamp expires.
    fn wait_time(&self, now: Instant, window_size: Duration) -> Duration {
        self.timestamps
            .front()
            .map(|oldest| window_size.saturating_sub(now.saturating_duration_since(*oldest)))
            .unwrap_or(Duration::ZERO)
    }
}

/// Sliding window rate limiter for multiple providers.
///
/// Windows are created on demand. Providers without an explicit
/// configuration use [`RateLimitConfig::default`].
pub struct RateLimiter {
    windows: Mutex<HashMap<(String, String), RateWindow>>,
    configs: Mutex<HashMap<String, RateLimitConfig>>,
    default_config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter with default settings.
    pub fn new() -> Self {
        Self::with_default_config(RateLimitConfig::default())
    }

    /// Create a rate limiter whose unconfigured providers use `config`.
    pub fn with_default_config(config: RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
            default_config: config,
        }
    }

    /// Lock the windows mutex, recovering from poison if necessary.
    ///
    /// A poisoned window map only means a slightly wrong count, which is
    /// better than panicking the sync loop.
    fn lock_windows(&self) -> MutexGuard<'_, HashMap<(String, String), RateWindow>> {
        self.windows.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter windows mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, RateLimitConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure limits for a specific provider.
    ///
    /// Existing windows for the provider are kept; the new limits apply
    /// from the next check on.
    pub fn configure(&self, provider: &str, config: RateLimitConfig) {
        info!(
            "Rate limiter: '{}' configured for {} requests (+{} burst) per {:?}",
            provider, config.requests_per_window, config.burst_allowance, config.window_size
        );
        self.lock_configs().insert(provider.to_string(), config);
    }

    /// The effective configuration for a provider.
    pub fn config_for(&self, provider: &str) -> RateLimitConfig {
        self.lock_configs()
            .get(provider)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    /// Atomically prune, count and (if there is room) record a request.
    ///
    /// Returns `Ok(())` when admitted, or `Err(wait)` with the time until
    /// the oldest in-window request expires.
    fn check(&self, provider: &str, identifier: &str) -> Result<(), Duration> {
        let config = self.config_for(provider);
        let now = Instant::now();
        let mut windows = self.lock_windows();

        let window = windows
            .entry((provider.to_string(), identifier.to_string()))
            .or_default();
        window.prune(now, config.window_size);

        let count = window.timestamps.len();
        if count < config.max_requests() {
            window.timestamps.push_back(now);
            debug!(
                "Rate limiter: request allowed for '{}:{}' ({}/{})",
                provider,
                identifier,
                count + 1,
                config.max_requests()
            );
            Ok(())
        } else {
            Err(window.wait_time(now, config.window_size))
        }
    }

    /// Check whether a request is allowed right now, recording it if so.
    pub fn is_allowed(&self, provider: &str, identifier: &str) -> bool {
        match self.check(provider, identifier) {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "Rate limiter: request denied for '{}:{}', window full",
                    provider, identifier
                );
                false
            }
        }
    }

    /// Wait (asynchronously) until a request is admitted.
    ///
    /// Re-checks after every sleep since other callers may have taken the
    /// freed slot in the meantime.
    ///
    /// # Errors
    ///
    /// Returns [`MarketDataError::RateLimitExceeded`] with the computed wait as
    /// retry hint if the required wait exceeds the configured ceiling.
    pub async fn wait_if_needed(
        &self,
        provider: &str,
        identifier: &str,
    ) -> Result<(), MarketDataError> {
        loop {
            let wait = match self.check(provider, identifier) {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            let ceiling = self.config_for(provider).wait_ceiling;
            if wait > ceiling {
                warn!(
                    "Rate limiter: '{}:{}' would need to wait {:.1}s (ceiling {:.1}s)",
                    provider,
                    identifier,
                    wait.as_secs_f64(),
                    ceiling.as_secs_f64()
                );
                return Err(MarketDataError::RateLimitExceeded {
                    provider: provider.to_string(),
                    message: format!(
                        "Rate limit exceeded, would need to wait {:.1} seconds",
                        wait.as_secs_f64()
                    ),
                    retry_after: Some(wait),
                });
            }

            info!(
                "Rate limiter: window full for '{}:{}', waiting {:?}",
                provider, identifier, wait
            );
            // A zero wait can only come from a window configured with no
            // capacity at all; don't spin on it.
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Time until the oldest in-window request expires, or zero if the
    /// window is empty.
    pub fn wait_time(&self, provider: &str, identifier: &str) -> Duration {
        let config = self.config_for(provider);
        let now = Instant::now();
        let mut windows = self.lock_windows();

        match windows.get_mut(&(provider.to_string(), identifier.to_string())) {
            Some(window) => {
                window.prune(now, config.window_size);
                window.wait_time(now, config.window_size)
            }
            None => Duration::ZERO,
        }
    }

    /// Current usage of a window.
    pub fn usage(&self, provider: &str, identifier: &str) -> RateLimitUsage {
        let config = self.config_for(provider);
        let max = config.max_requests();
        let now = Instant::now();
        let mut windows = self.lock_windows();

        let (count, wait) = match windows.get_mut(&(provider.to_string(), identifier.to_string()))
        {
            Some(window) => {
                window.prune(now, config.window_size);
                (
                    window.timestamps.len(),
                    window.wait_time(now, config.window_size),
                )
            }
            None => (0, Duration::ZERO),
        };

        let remaining = max.saturating_sub(count);
        RateLimitUsage {
            count,
            max,
            remaining,
            reset_eta: (remaining == 0 && wait > Duration::ZERO).then_some(wait),
        }
    }

    /// Clear the window for an identifier (ops and testing use).
    pub fn reset(&self, provider: &str, identifier: &str) {
        self.lock_windows()
            .remove(&(provider.to_string(), identifier.to_string()));
        info!("Rate limiter: reset '{}:{}'", provider, identifier);
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
