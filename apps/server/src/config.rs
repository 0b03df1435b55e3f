use std::time::Duration;

use anyhow::{anyhow, Context};
use rottenstocks_core::sync::{SyncConfig, SyncMode};
use rottenstocks_market_data::{MarketDataConfig, ResilienceSettings};

const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 15;
const DEFAULT_BATCH_SIZE: usize = 50;

pub struct Config {
    pub api_key: String,
    pub market_data: MarketDataConfig,
    pub sync: SyncConfig,
    pub sync_interval: Duration,
    pub watchlist: Vec<String>,
}

impl Config {
    /// Read configuration from the environment, loading `.env` first.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = ResilienceSettings::default();

        let settings = ResilienceSettings {
            requests_per_window: parse_or(&var, "RS_REQUESTS_PER_WINDOW", defaults.requests_per_window)?,
            burst_allowance: parse_or(&var, "RS_BURST_ALLOWANCE", defaults.burst_allowance)?,
            window_size_seconds: parse_or(&var, "RS_WINDOW_SIZE_SECONDS", defaults.window_size_seconds)?,
            failure_threshold: parse_or(&var, "RS_FAILURE_THRESHOLD", defaults.failure_threshold)?,
            recovery_timeout_seconds: parse_or(
                &var,
                "RS_RECOVERY_TIMEOUT_SECONDS",
                defaults.recovery_timeout_seconds,
            )?,
            max_attempts: parse_or(&var, "RS_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_delay_seconds: parse_or(&var, "RS_BASE_DELAY_SECONDS", defaults.base_delay_seconds)?,
            max_delay_seconds: parse_or(&var, "RS_MAX_DELAY_SECONDS", defaults.max_delay_seconds)?,
            jitter_enabled: parse_or(&var, "RS_JITTER_ENABLED", defaults.jitter_enabled)?,
            daily_request_limit: parse_or(&var, "RS_DAILY_REQUEST_LIMIT", defaults.daily_request_limit)?,
            wait_ceiling_seconds: parse_or(
                &var,
                "RS_WAIT_CEILING_SECONDS",
                defaults.wait_ceiling_seconds,
            )?,
        };
        let market_data = MarketDataConfig::from_settings(&settings)?;

        let sweep_mode = match var("RS_SYNC_MODE") {
            Some(mode) => mode.parse::<SyncMode>()?,
            None => SyncMode::default(),
        };
        let batch_size = parse_or(&var, "RS_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 {
            return Err(anyhow!("RS_BATCH_SIZE must be at least 1"));
        }
        let sync = SyncConfig {
            daily_request_limit: settings.daily_request_limit,
            batch_size,
            sweep_mode,
            ..Default::default()
        };

        let interval_minutes =
            parse_or(&var, "RS_SYNC_INTERVAL_MINUTES", DEFAULT_SYNC_INTERVAL_MINUTES)?;
        if interval_minutes == 0 {
            return Err(anyhow!("RS_SYNC_INTERVAL_MINUTES must be at least 1"));
        }
        let interval_secs = interval_minutes
            .checked_mul(60)
            .ok_or_else(|| anyhow!("RS_SYNC_INTERVAL_MINUTES is out of range"))?;

        let api_key = var("ALPHA_VANTAGE_API_KEY")
            .ok_or_else(|| anyhow!("ALPHA_VANTAGE_API_KEY is not set"))?;

        let watchlist = var("RS_WATCHLIST")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            api_key,
            market_data,
            sync,
            sync_interval: Duration::from_secs(interval_secs),
            watchlist,
        })
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
