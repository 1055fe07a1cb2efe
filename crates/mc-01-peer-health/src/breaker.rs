//! # Circuit Breaker
//!
//! One circuit per (peer, operation) pair.
//!
//! ## States
//!
//! - **Closed**: requests flow; consecutive failures are counted
//! - **Open**: requests are short-circuited for the cooldown
//! - **Half-Open**: exactly one probe is allowed; success closes the
//!   circuit, failure re-opens it with a fresh cooldown

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{info, warn};

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Circuit {
    state: BreakerState,
    failure_count: u32,
    opened_at: Option<Instant>,
    probe_outstanding: bool,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            opened_at: None,
            probe_outstanding: false,
        }
    }
}

/// Circuit breaker table keyed by (peer, operation).
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    circuits: RwLock<HashMap<(String, String), Circuit>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            circuits: RwLock::new(HashMap::new()),
        }
    }

    /// Whether a request to `peer` for `operation` may proceed. In the
    /// half-open state only the first caller gets the probe slot.
    pub fn should_allow(&self, peer: &str, operation: &str) -> bool {
        let mut circuits = self.circuits.write();
        let circuit = circuits
            .entry((peer.to_string(), operation.to_string()))
            .or_insert_with(Circuit::new);

        match circuit.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => {
                if circuit.probe_outstanding {
                    false
                } else {
                    circuit.probe_outstanding = true;
                    true
                }
            }
            BreakerState::Open => {
                let elapsed = circuit.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed < self.cooldown {
                    return false;
                }
                circuit.state = BreakerState::HalfOpen;
                circuit.probe_outstanding = true;
                info!(peer, operation, "circuit half-open; probe allowed");
                true
            }
        }
    }

    /// Record a successful request.
    pub fn record_success(&self, peer: &str, operation: &str) {
        let mut circuits = self.circuits.write();
        let circuit = circuits
            .entry((peer.to_string(), operation.to_string()))
            .or_insert_with(Circuit::new);

        match circuit.state {
            BreakerState::Closed => circuit.failure_count = 0,
            BreakerState::HalfOpen => {
                circuit.state = BreakerState::Closed;
                circuit.failure_count = 0;
                circuit.opened_at = None;
                circuit.probe_outstanding = false;
                info!(peer, operation, "circuit closed after successful probe");
            }
            BreakerState::Open => {}
        }
    }

    /// Record a failed request.
    pub fn record_failure(&self, peer: &str, operation: &str) {
        let mut circuits = self.circuits.write();
        let circuit = circuits
            .entry((peer.to_string(), operation.to_string()))
            .or_insert_with(Circuit::new);

        match circuit.state {
            BreakerState::Closed => {
                circuit.failure_count += 1;
                if circuit.failure_count >= self.failure_threshold {
                    circuit.state = BreakerState::Open;
                    circuit.opened_at = Some(Instant::now());
                    warn!(peer, operation, failures = circuit.failure_count, "circuit opened");
                }
            }
            BreakerState::HalfOpen => {
                circuit.state = BreakerState::Open;
                circuit.opened_at = Some(Instant::now());
                circuit.probe_outstanding = false;
                warn!(peer, operation, "probe failed; circuit re-opened");
            }
            BreakerState::Open => {}
        }
    }

    /// Current state of a circuit (closed if never used).
    pub fn state(&self, peer: &str, operation: &str) -> BreakerState {
        self.circuits
            .read()
            .get(&(peer.to_string(), operation.to_string()))
            .map(|c| c.state)
            .unwrap_or(BreakerState::Closed)
    }
}
