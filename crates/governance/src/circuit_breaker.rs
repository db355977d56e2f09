//! Per-(tenant, action) circuit breaker.
//!
//! State lives in a sharded concurrent map; every transition for one key
//! happens under that key's shard lock, so transitions are linearizable per
//! key while different tenants never contend on a single global lock.
//! Recovery is lazy: an open circuit is only re-examined on the next
//! `allow()` call.

use dashmap::DashMap;
use serde::Serialize;
use std::time::{Duration, Instant};

use operative_core::config::CircuitBreakerConfig;
use operative_core::types::StateKey;

/// Breaker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// State tracked for one key.
#[derive(Debug, Clone)]
pub struct CircuitState {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
    pub half_open_calls: u32,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            half_open_calls: 0,
        }
    }
}

/// Answer to `allow()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitDecision {
    pub allowed: bool,
    pub state: BreakerState,
    pub reason: &'static str,
}

impl CircuitDecision {
    fn new(allowed: bool, state: BreakerState, reason: &'static str) -> Self {
        Self {
            allowed,
            state,
            reason,
        }
    }
}

/// Circuit breaker keyed by `(tenant_id, action)`.
///
/// Keys are allocated lazily and never evicted.
pub struct CircuitBreaker {
    circuits: DashMap<StateKey, CircuitState>,
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_calls: u32,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            circuits: DashMap::new(),
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: config.recovery_timeout(),
            half_open_max_calls: config.half_open_max_calls.max(1),
        }
    }

    /// Decide whether a call for this key may proceed.
    pub fn allow(&self, tenant_id: &str, action: &str) -> CircuitDecision {
        let key = StateKey::new(tenant_id, action);
        let mut entry = self.circuits.entry(key).or_default();
        let circuit = entry.value_mut();

        match circuit.state {
            BreakerState::Closed => CircuitDecision::new(true, BreakerState::Closed, "closed"),
            BreakerState::Open => {
                let recovered = circuit
                    .opened_at
                    .map_or(true, |at| at.elapsed() > self.recovery_timeout);
                if !recovered {
                    return CircuitDecision::new(false, BreakerState::Open, "circuit_open");
                }
                circuit.state = BreakerState::HalfOpen;
                circuit.half_open_calls = 1;
                tracing::info!(
                    tenant_id = tenant_id,
                    action = action,
                    "Circuit HALF_OPEN, admitting trial call"
                );
                crate::metrics::track_circuit_transition(BreakerState::HalfOpen);
                CircuitDecision::new(true, BreakerState::HalfOpen, "half_open_trial")
            }
            BreakerState::HalfOpen => {
                if circuit.half_open_calls < self.half_open_max_calls {
                    circuit.half_open_calls += 1;
                    CircuitDecision::new(true, BreakerState::HalfOpen, "half_open_trial")
                } else {
                    CircuitDecision::new(false, BreakerState::HalfOpen, "half_open_limit")
                }
            }
        }
    }

    /// Record a successful call: closes a half-open circuit and clears the
    /// failure streak.
    pub fn record_success(&self, tenant_id: &str, action: &str) {
        let key = StateKey::new(tenant_id, action);
        let mut entry = self.circuits.entry(key).or_default();
        let circuit = entry.value_mut();

        if circuit.state == BreakerState::HalfOpen {
            tracing::info!(tenant_id = tenant_id, action = action, "Circuit CLOSED after trial call");
            crate::metrics::track_circuit_transition(BreakerState::Closed);
        }
        *circuit = CircuitState::default();
    }

    /// Record a failed call.
    pub fn record_failure(&self, tenant_id: &str, action: &str) {
        let key = StateKey::new(tenant_id, action);
        let mut entry = self.circuits.entry(key).or_default();
        let circuit = entry.value_mut();

        circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);

        match circuit.state {
            BreakerState::HalfOpen => {
                circuit.state = BreakerState::Open;
                circuit.opened_at = Some(Instant::now());
                circuit.half_open_calls = 0;
                tracing::warn!(
                    tenant_id = tenant_id,
                    action = action,
                    "Circuit breaker RE-OPENED (trial call failed)"
                );
                crate::metrics::track_circuit_transition(BreakerState::Open);
            }
            BreakerState::Closed if circuit.consecutive_failures >= self.failure_threshold => {
                circuit.state = BreakerState::Open;
                circuit.opened_at = Some(Instant::now());
                tracing::warn!(
                    tenant_id = tenant_id,
                    action = action,
                    failures = circuit.consecutive_failures,
                    "Circuit breaker OPENED"
                );
                crate::metrics::track_circuit_transition(BreakerState::Open);
            }
            // Late failures from calls admitted before the circuit opened do
            // not extend the cooldown.
            _ => {}
        }
    }

    /// Return a half-open slot taken by `allow()` for a call that ended before it
    /// reached the protected operation (rate limited, denied by policy).
    pub fn release_half_open_slot(&self, tenant_id: &str, action: &str) {
        if let Some(mut entry) = self.circuits.get_mut(&StateKey::new(tenant_id, action)) {
            let circuit = entry.value_mut();
            if circuit.state == BreakerState::HalfOpen && circuit.half_open_calls > 0 {
                circuit.half_open_calls -= 1;
                tracing::debug!(
                    tenant_id = tenant_id,
                    action = action,
                    remaining = self.half_open_max_calls - circuit.half_open_calls,
                    "Half-open slot released"
                );
            }
        }
    }

    /// Current state for a key, if it has been seen.
    pub fn snapshot(&self, tenant_id: &str, action: &str) -> Option<CircuitState> {
        self.circuits
            .get(&StateKey::new(tenant_id, action))
            .map(|e| e.value().clone())
    }

    /// Force a key back to closed.
    pub fn reset(&self, tenant_id: &str, action: &str) {
        self.circuits
            .insert(StateKey::new(tenant_id, action), CircuitState::default());
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.circuits.len()
    }
}
