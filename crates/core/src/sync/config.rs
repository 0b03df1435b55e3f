use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// How much data a sync fetches per stock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Quote only (one request per stock).
    #[default]
    Quick,
    /// Quote plus company overview (two requests per stock).
    Full,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Quick => write!(f, "quick"),
            SyncMode::Full => write!(f, "full"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(SyncMode::Quick),
            "full" => Ok(SyncMode::Full),
            other => Err(Error::InvalidConfigValue(format!(
                "sync mode must be 'quick' or 'full', got '{}'",
                other
            ))),
        }
    }
}

/// Synchronization settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Provider requests allowed per calendar day (UTC).
    pub daily_request_limit: u32,
    /// Maximum stocks considered per sweep.
    pub batch_size: usize,
    /// Pause between consecutive stocks in a sweep.
    pub inter_request_delay: Duration,
    /// Mode used by sweeps.
    pub sweep_mode: SyncMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            daily_request_limit: 25,
            batch_size: 50,
            inter_request_delay: Duration::from_secs(1),
            sweep_mode: SyncMode::Quick,
        }
    }
}
