//! Circuit Breaker Pattern
//!
//! Prevents cascading failures by temporarily blocking calls to a failing
//! dependency. One circuit per named operation.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive counted failures before opening the circuit
    pub failure_threshold: u32,
    /// Duration to keep the circuit open before admitting a probe
    pub open_timeout: Duration,
    /// Successful probes in half-open needed to close the circuit
    pub success_threshold: u32,
    /// Window for counting failures (failures older than this are forgotten)
    pub failure_window: Duration,
    /// Upper bound on a single call, combined with the caller's deadline
    pub call_timeout: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 6,
            open_timeout: Duration::from_secs(60),
            success_threshold: 1,
            failure_window: Duration::from_secs(60),
            call_timeout: None,
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    /// Normal operation - calls allowed
    #[default]
    Closed,
    /// Circuit tripped - calls blocked
    Open,
    /// Testing recovery - one probe at a time
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Per-operation circuit state.
#[derive(Debug)]
struct Circuit {
    config: CircuitBreakerConfig,
    state: CircuitState,
    /// Bumped on every state change and on every probe grant
    generation: u64,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
    last_failure: Option<Instant>,
    /// Set while the single half-open probe is outstanding
    probe_started: Option<Instant>,
}

impl Circuit {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            generation: 0,
            failures: 0,
            successes: 0,
            opened_at: None,
            last_failure: None,
            probe_started: None,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.generation += 1;
        self.opened_at = Some(now);
        self.successes = 0;
        self.probe_started = None;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.generation += 1;
        self.failures = 0;
        self.successes = 0;
        self.opened_at = None;
        self.probe_started = None;
    }

    fn grant_probe(&mut self, now: Instant) -> u64 {
        self.generation += 1;
        self.probe_started = Some(now);
        self.generation
    }

    /// A probe outstanding for longer than the open timeout is abandoned.
    fn probe_expired(&self, now: Instant) -> bool {
        self.probe_started
            .map(|at| now.saturating_duration_since(at) >= self.config.open_timeout)
            .unwrap_or(true)
    }
}

/// Admission for one call through a circuit.
///
/// Settle it with [`record_success`](Self::record_success),
/// [`record_failure`](Self::record_failure) or [`release`](Self::release).
/// Dropping an unsettled permit releases it, so a call future that is
/// dropped mid-flight never holds the half-open probe slot. Outcomes
/// reported under a generation the circuit has moved past are ignored.
#[must_use = "an unsettled permit is released when dropped"]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    operation: &'a str,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl CircuitPermit<'_> {
    /// Generation of the circuit when this call was admitted.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this call is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// The call reached the dependency and got an answer.
    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.operation, self.generation);
    }

    /// The call failed in a way that counts against the dependency.
    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.operation, self.generation);
    }

    /// The outcome says nothing about the dependency's health.
    pub fn release(self) {}
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.on_release(self.operation, self.generation);
        }
    }
}

/// Circuit breaker for named operations.
///
/// Each circuit is updated under its own lock, so the half-open probe
/// reservation and the state transition happen atomically.
pub struct CircuitBreaker {
    default_config: CircuitBreakerConfig,
    circuits: DashMap<String, Mutex<Circuit>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker. `default_config` applies to operations
    /// that were never configured explicitly.
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            circuits: DashMap::new(),
        }
    }

    /// Install (or replace) the configuration for an operation. The
    /// circuit starts closed.
    pub fn configure(&self, operation: &str, config: CircuitBreakerConfig) {
        self.circuits
            .insert(operation.to_string(), Mutex::new(Circuit::new(config)));
    }

    fn with_circuit<T>(&self, operation: &str, f: impl FnOnce(&mut Circuit) -> T) -> T {
        let entry = self
            .circuits
            .entry(operation.to_string())
            .or_insert_with(|| Mutex::new(Circuit::new(self.default_config.clone())));
        let mut circuit = entry.lock();
        f(&mut circuit)
    }

    /// The per-call timeout configured for an operation.
    pub fn call_timeout(&self, operation: &str) -> Option<Duration> {
        self.circuits
            .get(operation)
            .map(|c| c.lock().config.call_timeout)
            .unwrap_or(self.default_config.call_timeout)
    }

    /// Ask to make a call to this operation.
    ///
    /// Returns `None` if the circuit is open or the half-open probe is
    /// already taken.
    pub fn allow_request<'a>(&'a self, operation: &'a str) -> Option<CircuitPermit<'a>> {
        let now = Instant::now();
        let admitted = self.with_circuit(operation, |circuit| match circuit.state {
            CircuitState::Closed => Some((circuit.generation, false)),
            CircuitState::Open => {
                let cooled = circuit
                    .opened_at
                    .map(|at| now.saturating_duration_since(at) >= circuit.config.open_timeout)
                    .unwrap_or(true);
                if cooled {
                    circuit.state = CircuitState::HalfOpen;
                    circuit.successes = 0;
                    tracing::info!("circuit breaker for {} transitioning to half-open", operation);
                    Some((circuit.grant_probe(now), true))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if circuit.probe_expired(now) {
                    if circuit.probe_started.is_some() {
                        tracing::warn!("circuit breaker for {} abandoned a stale probe", operation);
                    }
                    Some((circuit.grant_probe(now), true))
                } else {
                    None
                }
            }
        });

        admitted.map(|(generation, probe)| CircuitPermit {
            breaker: self,
            operation,
            generation,
            probe,
            settled: false,
        })
    }

    fn with_current<F>(&self, operation: &str, generation: u64, f: F)
    where
        F: FnOnce(&mut Circuit),
    {
        if let Some(entry) = self.circuits.get(operation) {
            let mut circuit = entry.lock();
            if circuit.generation == generation {
                f(&mut circuit);
            }
        }
    }

    fn on_success(&self, operation: &str, generation: u64) {
        self.with_current(operation, generation, |circuit| match circuit.state {
            CircuitState::HalfOpen => {
                circuit.probe_started = None;
                circuit.successes += 1;
                if circuit.successes >= circuit.config.success_threshold {
                    circuit.close();
                    tracing::info!("circuit breaker for {} closed (recovered)", operation);
                }
            }
            CircuitState::Closed => {
                circuit.failures = 0;
            }
            CircuitState::Open => {}
        })
    }

    fn on_failure(&self, operation: &str, generation: u64) {
        let now = Instant::now();
        self.with_current(operation, generation, |circuit| match circuit.state {
            CircuitState::Closed => {
                let stale = circuit
                    .last_failure
                    .map(|at| now.saturating_duration_since(at) > circuit.config.failure_window)
                    .unwrap_or(false);
                circuit.failures = if stale { 1 } else { circuit.failures + 1 };
                circuit.last_failure = Some(now);

                if circuit.failures >= circuit.config.failure_threshold {
                    circuit.open(now);
                    tracing::warn!(
                        "circuit breaker for {} opened after {} failures",
                        operation,
                        circuit.failures
                    );
                }
            }
            CircuitState::HalfOpen => {
                circuit.open(now);
                tracing::warn!(
                    "circuit breaker for {} re-opened (probe failed)",
                    operation
                );
            }
            CircuitState::Open => {}
        })
    }

    fn on_release(&self, operation: &str, generation: u64) {
        self.with_current(operation, generation, |circuit| {
            if circuit.state == CircuitState::HalfOpen {
                circuit.probe_started = None;
            }
        })
    }

    /// Get the current state of a circuit.
    pub fn get_state(&self, operation: &str) -> CircuitState {
        self.circuits
            .get(operation)
            .map(|c| c.lock().state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Get metrics for a circuit.
    pub fn get_metrics(&self, operation: &str) -> CircuitMetrics {
        self.circuits
            .get(operation)
            .map(|c| {
                let circuit = c.lock();
                CircuitMetrics {
                    state: circuit.state,
                    generation: circuit.generation,
                    failures: circuit.failures,
                    successes: circuit.successes,
                }
            })
            .unwrap_or_default()
    }

    /// Get all circuit states.
    pub fn all_states(&self) -> Vec<(String, CircuitState)> {
        self.circuits
            .iter()
            .map(|e| (e.key().clone(), e.value().lock().state))
            .collect()
    }

    /// Manually reset a circuit to closed.
    pub fn reset(&self, operation: &str) {
        if let Some(circuit) = self.circuits.get(operation) {
            circuit.lock().close();
            tracing::info!("circuit breaker for {} manually reset", operation);
        }
    }

    /// Clear all circuit states.
    pub fn clear_all(&self) {
        self.circuits.clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

/// Metrics for a circuit.
#[derive(Debug, Clone, Default)]
pub struct CircuitMetrics {
    pub state: CircuitState,
    pub generation: u64,
    pub failures: u32,
    pub successes: u32,
}
