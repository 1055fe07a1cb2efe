//! Peer networking configuration.

use std::time::Duration;

use crate::balancer::SelectionStrategy;

/// Tunables for health probing, routing, and failover.
#[derive(Debug, Clone)]
pub struct PeerNetConfig {
    /// Health probe timeout.
    pub probe_timeout: Duration,
    /// Interval between probe rounds.
    pub probe_interval: Duration,
    /// Probe window length per peer.
    pub probe_window: usize,
    /// Routing strategy.
    pub strategy: SelectionStrategy,
    /// Consecutive failures before a circuit opens.
    pub breaker_failure_threshold: u32,
    /// Cooldown before an open circuit allows a probe.
    pub breaker_cooldown: Duration,
    /// Failover attempts per logical operation.
    pub max_retries: u32,
    /// Base backoff between failover attempts; doubles per attempt.
    pub retry_backoff: Duration,
}

impl Default for PeerNetConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
            probe_interval: Duration::from_secs(30),
            probe_window: 20,
            strategy: SelectionStrategy::HealthBased,
            breaker_failure_threshold: 5,
            breaker_cooldown: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(200),
        }
    }
}
