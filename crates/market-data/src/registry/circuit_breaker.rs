//! Per-provider circuit breaker for fault tolerance.
//!
//! Implements the circuit breaker pattern to stop hammering a provider that
//! is down. The circuit has three states:
//!
//! - **Closed**: Normal operation, requests are allowed through.
//! - **Open**: Provider is failing, requests are rejected immediately.
//! - **HalfOpen**: Recovery timeout elapsed; exactly one probe is let through.
//!
//! ```text
//! Closed   --(failure_count >= threshold)--> Open
//! Open     --(admit after recovery_timeout)--> HalfOpen (probe admitted)
//! HalfOpen --(probe succeeds)--> Closed
//! HalfOpen --(probe fails)--> Open (recovery timer restarts)
//! ```
//!
//! Only failures whose [`ErrorKind`] is listed in
//! [`CircuitBreakerConfig::failure_kinds`] are counted. The breaker is
//! in-memory and resets on application restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::errors::ErrorKind;

/// Default number of failures before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time to wait before transitioning from Open to HalfOpen.
const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests are allowed.
    Closed,
    /// Provider is failing - requests are blocked.
    Open,
    /// Testing recovery - a single probe is allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Internal circuit state for a single provider.
#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    /// Counted failures since the last success.
    failure_count: u32,
    last_failure: Option<Instant>,
    /// Set while the HalfOpen probe is outstanding.
    probe_in_flight: bool,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            probe_in_flight: false,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitBreakerConfig {
    /// Number of counted failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time to wait after the last failure before probing.
    pub recovery_timeout: Duration,
    /// Failure kinds that count toward opening the circuit.
    pub failure_kinds: Vec<ErrorKind>,
}

impl CircuitBreakerConfig {
    /// Whether a failure of this kind affects the circuit.
    pub fn counts(&self, kind: ErrorKind) -> bool {
        self.failure_kinds.contains(&kind)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            failure_kinds: vec![
                ErrorKind::NetworkFailure,
                ErrorKind::ServiceUnavailable,
                ErrorKind::RateLimitExceeded,
            ],
        }
    }
}

/// Admission granted by [`CircuitBreaker::acquire`].
///
/// Settle it with [`success`](Self::success) or [`failure`](Self::failure).
/// Dropping an unsettled probe permit releases the probe slot.
#[must_use = "an unsettled permit releases its probe slot when dropped"]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    provider: &'a str,
    probe: bool,
    settled: bool,
}

impl CircuitPermit<'_> {
    /// Whether this permit is the HalfOpen probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success(self.provider);
    }

    pub fn failure(mut self, kind: ErrorKind) {
        self.settled = true;
        self.breaker.record_failure(self.provider, kind);
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            debug!(
                "Circuit breaker: probe for '{}' abandoned, releasing slot",
                self.provider
            );
            self.breaker.release_probe(self.provider);
        }
    }
}

/// Point-in-time view of a provider's circuit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    /// Current circuit state.
    pub state: CircuitState,
    /// Counted failures since the last success.
    pub failure_count: u32,
}

/// Metrics for a single circuit.
#[derive(Clone, Debug)]
pub struct CircuitMetrics {
    /// Provider identifier.
    pub provider: String,
    /// Current circuit state.
    pub state: CircuitState,
    /// Number of recorded failures.
    pub failure_count: u32,
    /// Time since the last counted failure.
    pub since_last_failure: Option<Duration>,
}

/// Per-provider circuit breaker.
///
/// Thread-safe: every check-and-update happens under a single lock
/// acquisition.
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<String, Circuit>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default settings.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a circuit breaker with custom configuration.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// The breaker configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Lock the circuits mutex, recovering from poison if necessary.
    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<String, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Check if a request may go out to a provider.
    ///
    /// - Closed: always true.
    /// - Open: false until `recovery_timeout` has elapsed since the last
    ///   failure; the first check after that flips to HalfOpen and admits
    ///   the probe.
    /// - HalfOpen: true only if no probe is outstanding.
    ///
    /// An admitted probe stays outstanding until `record_success`,
    /// `record_failure` or `release_probe`. Prefer [`acquire`](Self::acquire),
    /// which releases it automatically.
    pub fn is_allowed(&self, provider: &str) -> bool {
        self.admit(provider).is_some()
    }

    /// Admit a request and return a permit that settles it.
    ///
    /// Returns `None` when the circuit rejects the request. A half-open probe
    /// permit dropped without being settled gives the probe slot back, so a
    /// cancelled call cannot leave the circuit stuck in HalfOpen.
    pub fn acquire<'a>(&'a self, provider: &'a str) -> Option<CircuitPermit<'a>> {
        self.admit(provider).map(|probe| CircuitPermit {
            breaker: self,
            provider,
            probe,
            settled: false,
        })
    }

    /// Admission decision; `Some(true)` when the request is the HalfOpen probe.
    fn admit(&self, provider: &str) -> Option<bool> {
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed => Some(false),
            CircuitState::HalfOpen => {
                if circuit.probe_in_flight {
                    debug!(
                        "Circuit breaker: probe already in flight for '{}', rejecting",
                        provider
                    );
                    None
                } else {
                    circuit.probe_in_flight = true;
                    Some(true)
                }
            }
            CircuitState::Open => {
                let recovered = circuit
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= self.config.recovery_timeout);
                if recovered {
                    info!(
                        "Circuit breaker: transitioning '{}' from open to half-open",
                        provider
                    );
                    circuit.state = CircuitState::HalfOpen;
                    circuit.probe_in_flight = true;
                    Some(true)
                } else {
                    None
                }
            }
        }
    }

    /// Record a successful request.
    ///
    /// Resets the failure count; a successful probe closes the circuit.
    pub fn record_success(&self, provider: &str) {
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed => {
                if circuit.failure_count > 0 {
                    debug!(
                        "Circuit breaker: success for '{}', failure count reset",
                        provider
                    );
                }
                circuit.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: closing circuit for '{}' after successful probe",
                    provider
                );
                *circuit = Circuit::new();
            }
            CircuitState::Open => {
                // is_allowed should have moved us to HalfOpen first
                debug!(
                    "Circuit breaker: unexpected success for '{}' in open state",
                    provider
                );
            }
        }
    }

    /// Record a failed request of the given kind.
    ///
    /// Kinds outside the configured `failure_kinds` leave the counters
    /// untouched; they only free the HalfOpen probe slot so another probe
    /// can be attempted.
    pub fn record_failure(&self, provider: &str, kind: ErrorKind) {
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        if !self.config.counts(kind) {
            debug!(
                "Circuit breaker: '{}' failure for '{}' not counted",
                kind, provider
            );
            circuit.probe_in_flight = false;
            return;
        }

        circuit.failure_count += 1;
        circuit.last_failure = Some(Instant::now());

        match circuit.state {
            CircuitState::Closed => {
                if circuit.failure_count >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker: opening circuit for '{}' after {} failures",
                        provider, circuit.failure_count
                    );
                    circuit.state = CircuitState::Open;
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{})",
                        provider, circuit.failure_count, self.config.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    "Circuit breaker: reopening circuit for '{}' after failed probe",
                    provider
                );
                circuit.state = CircuitState::Open;
                circuit.probe_in_flight = false;
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: additional failure for '{}' (already open)",
                    provider
                );
            }
        }
    }

    /// Give back an admitted HalfOpen probe that never reached the provider.
    pub fn release_probe(&self, provider: &str) {
        if let Some(circuit) = self.lock_circuits().get_mut(provider) {
            circuit.probe_in_flight = false;
        }
    }

    /// Get the current state for a provider.
    pub fn state(&self, provider: &str) -> CircuitState {
        self.snapshot(provider).state
    }

    /// Get the failure count for a provider.
    pub fn failure_count(&self, provider: &str) -> u32 {
        self.snapshot(provider).failure_count
    }

    /// State and failure count for a provider.
    pub fn snapshot(&self, provider: &str) -> CircuitSnapshot {
        self.lock_circuits()
            .get(provider)
            .map(|c| CircuitSnapshot {
                state: c.state,
                failure_count: c.failure_count,
            })
            .unwrap_or(CircuitSnapshot {
                state: CircuitState::Closed,
                failure_count: 0,
            })
    }

    /// Reset the circuit for a provider to Closed state.
    pub fn reset(&self, provider: &str) {
        if let Some(circuit) = self.lock_circuits().get_mut(provider) {
            info!(
                "Circuit breaker: manually resetting circuit for '{}'",
                provider
            );
            *circuit = Circuit::new();
        }
    }

    /// Reset all circuits to their initial state.
    pub fn reset_all(&self) {
        self.lock_circuits().clear();
        info!("Circuit breaker: all circuits reset");
    }

    /// Get metrics for all tracked providers.
    pub fn metrics(&self) -> Vec<CircuitMetrics> {
        self.lock_circuits()
            .iter()
            .map(|(provider, circuit)| CircuitMetrics {
                provider: provider.clone(),
                state: circuit.state,
                failure_count: circuit.failure_count,
                since_last_failure: circuit.last_failure.map(|at| at.elapsed()),
            })
            .collect()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
