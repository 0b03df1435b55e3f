use serde::{Deserialize, Serialize};

/// Classified failure tag.
///
/// Every [`MarketDataError`](super::MarketDataError) maps onto exactly one kind.
/// The retry policy and the circuit breaker decide what to do with a failure by
/// looking the kind up in their tables, never by inspecting error messages.
///
/// # Default behavior
///
/// | Kind | Retried? | Counts toward circuit breaker? |
/// |------|----------|--------------------------------|
/// | `NetworkFailure` | Yes | Yes |
/// | `ClientError` | No | No |
/// | `RateLimitExceeded` | Yes (honors retry hint) | Yes |
/// | `ServiceUnavailable` | Yes | Yes |
/// | `ValidationFailure` | No | No |
/// | `CircuitOpen` | No (stop immediately) | No |
/// | `Configuration` | No | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection failure or timeout before a response arrived.
    NetworkFailure,

    /// 4xx response (other than 429) or an embedded provider error message.
    /// The request itself was wrong, retrying won't help.
    ClientError,

    /// HTTP 429, a provider throttling notice, or the local wait ceiling.
    RateLimitExceeded,

    /// 5xx response. The provider is down or overloaded.
    ServiceUnavailable,

    /// The provider answered successfully but the payload is malformed or empty.
    ValidationFailure,

    /// The circuit breaker rejected the call without touching the network.
    CircuitOpen,

    /// Programming or deployment error.
    Configuration,
}

impl ErrorKind {
    /// Stable snake_case name, used in logs and sweep reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkFailure => "network_failure",
            Self::ClientError => "client_error",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::ServiceUnavailable => "service_unavailable",
            Self::ValidationFailure => "validation_failure",
            Self::CircuitOpen => "circuit_open",
            Self::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
