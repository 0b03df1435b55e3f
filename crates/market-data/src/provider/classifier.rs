//! Response classification.
//!
//! Maps a raw provider response onto the error taxonomy before any success
//! parsing happens:
//!
//! 1. Status family: 429 → rate limit, 5xx → service unavailable,
//!    other 4xx → client error.
//! 2. Body shape: a 2xx body must be a JSON object.
//! 3. Soft errors: a 2xx JSON object is checked against a fixed table of
//!    known marker fields (e.g. Alpha Vantage's `"Note"`), since some
//!    providers report throttling and bad requests with HTTP 200.

use log::warn;
use serde_json::Value;

use super::traits::RawResponse;
use crate::errors::{ErrorKind, MarketDataError};

/// One row of the soft-error decision table.
#[derive(Clone, Copy, Debug)]
pub struct SoftErrorRule {
    /// Top-level JSON field that carries the marker.
    pub field: &'static str,
    /// Lowercase substrings, any of which must appear in the field's text.
    /// Empty means "any text".
    pub markers: &'static [&'static str],
    /// Resulting classification. `None` means log and carry on.
    pub kind: Option<ErrorKind>,
}

const THROTTLE_MARKERS: &[&str] = &[
    "api call frequency",
    "rate limit",
    "requests per day",
    "requests per minute",
];

/// Alpha Vantage soft-error table. Rules are evaluated in order and the
/// first match wins.
pub const ALPHA_VANTAGE_SOFT_ERRORS: &[SoftErrorRule] = &[
    SoftErrorRule {
        field: "Error Message",
        markers: &[],
        kind: Some(ErrorKind::ClientError),
    },
    SoftErrorRule {
        field: "Note",
        markers: THROTTLE_MARKERS,
        kind: Some(ErrorKind::RateLimitExceeded),
    },
    SoftErrorRule {
        field: "Information",
        markers: THROTTLE_MARKERS,
        kind: Some(ErrorKind::RateLimitExceeded),
    },
    SoftErrorRule {
        field: "Information",
        markers: &[],
        kind: Some(ErrorKind::ClientError),
    },
    SoftErrorRule {
        field: "Note",
        markers: &[],
        kind: None,
    },
];

/// Classifies raw responses for one provider.
#[derive(Clone, Copy, Debug)]
pub struct ResponseClassifier {
    rules: &'static [SoftErrorRule],
}

impl ResponseClassifier {
    pub const fn new(rules: &'static [SoftErrorRule]) -> Self {
        Self { rules }
    }

    /// Classifier with no soft-error rules (pure status/shape checks).
    pub const fn status_only() -> Self {
        Self { rules: &[] }
    }

    /// Classify a response, returning the JSON body on success.
    pub fn classify(&self, provider: &str, response: &RawResponse) -> Result<Value, MarketDataError> {
        if !(200..300).contains(&response.status) {
            return Err(classify_status(provider, response));
        }

        let body: Value = serde_json::from_str(&response.body).map_err(|e| {
            MarketDataError::validation(provider, format!("Invalid JSON response: {}", e))
        })?;

        if !body.is_object() {
            return Err(MarketDataError::validation(
                provider,
                "Expected a JSON object response",
            ));
        }

        self.check_soft_errors(provider, &body)?;
        Ok(body)
    }

    fn check_soft_errors(&self, provider: &str, body: &Value) -> Result<(), MarketDataError> {
        for rule in self.rules {
            let Some(text) = body.get(rule.field).and_then(Value::as_str) else {
                continue;
            };
            let lowered = text.to_lowercase();
            if !rule.markers.is_empty() && !rule.markers.iter().any(|m| lowered.contains(m)) {
                continue;
            }

            return match rule.kind {
                None => {
                    warn!("{} {}: {}", provider, rule.field, text);
                    Ok(())
                }
                Some(kind) => Err(soft_error(provider, kind, text)),
            };
        }
        Ok(())
    }
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new(ALPHA_VANTAGE_SOFT_ERRORS)
    }
}

fn soft_error(provider: &str, kind: ErrorKind, text: &str) -> MarketDataError {
    let provider = provider.to_string();
    let message = text.to_string();
    match kind {
        ErrorKind::RateLimitExceeded => MarketDataError::RateLimitExceeded {
            provider,
            message,
            retry_after: None,
        },
        ErrorKind::ServiceUnavailable => MarketDataError::ServiceUnavailable {
            provider,
            status: None,
            message,
        },
        ErrorKind::NetworkFailure => MarketDataError::NetworkFailure {
            provider,
            message,
            timed_out: false,
        },
        ErrorKind::ValidationFailure => MarketDataError::ValidationFailed { provider, message },
        ErrorKind::ClientError | ErrorKind::CircuitOpen | ErrorKind::Configuration => {
            MarketDataError::ClientError {
                provider,
                status: None,
                message,
            }
        }
    }
}

/// Map a non-2xx response by status family.
fn classify_status(provider: &str, response: &RawResponse) -> MarketDataError {
    let status = response.status;
    let message = error_message(response);
    let provider = provider.to_string();

    match status {
        429 => MarketDataError::RateLimitExceeded {
            provider,
            message,
            retry_after: response.retry_after,
        },
        500..=599 => MarketDataError::ServiceUnavailable {
            provider,
            status: Some(status),
            message,
        },
        400..=499 => MarketDataError::ClientError {
            provider,
            status: Some(status),
            message,
        },
        _ => MarketDataError::ValidationFailed {
            provider,
            message: format!("Unexpected HTTP status {}: {}", status, message),
        },
    }
}

/// Pull a human-readable message out of an error body.
fn error_message(response: &RawResponse) -> String {
    serde_json::from_str::<Value>(&response.body)
        .ok()
        .and_then(|body| {
            ["message", "error", "detail"]
                .iter()
                .find_map(|key| body.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| format!("HTTP {} error", response.status))
}
