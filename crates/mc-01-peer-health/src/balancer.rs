//! # Load Balancer
//!
//! Picks an outbound peer from the healthy ∪ degraded set. Strategy is
//! configured once at startup.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::health::{HealthMonitor, PeerSnapshot};

/// Peer selection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Rotate through peers, visiting each proportionally to its score.
    WeightedRoundRobin,
    /// Fewest in-flight requests first.
    LeastConnections,
    /// Highest health score first.
    HealthBased,
    /// Uniform random choice.
    Random,
}

/// Strategy-driven peer selector.
pub struct LoadBalancer {
    monitor: Arc<HealthMonitor>,
    strategy: SelectionStrategy,
    rr_cursor: AtomicUsize,
}

impl LoadBalancer {
    pub fn new(monitor: Arc<HealthMonitor>, strategy: SelectionStrategy) -> Self {
        Self {
            monitor,
            strategy,
            rr_cursor: AtomicUsize::new(0),
        }
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    /// Pick a peer, skipping any node id in `exclude`.
    pub fn select(&self, exclude: &[String]) -> Option<PeerSnapshot> {
        let candidates: Vec<PeerSnapshot> = self
            .monitor
            .eligible()
            .into_iter()
            .filter(|p| !exclude.contains(&p.node_id))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let chosen = match self.strategy {
            SelectionStrategy::HealthBased => candidates.into_iter().next(),
            SelectionStrategy::Random => {
                let i = rand::thread_rng().gen_range(0..candidates.len());
                candidates.into_iter().nth(i)
            }
            SelectionStrategy::LeastConnections => candidates
                .into_iter()
                .min_by_key(|p| (p.active_connections, std::cmp::Reverse(p.health_score))),
            SelectionStrategy::WeightedRoundRobin => {
                // Expand each candidate by score so healthier peers get
                // proportionally more slots, then rotate.
                let slots: Vec<usize> = candidates
                    .iter()
                    .enumerate()
                    .flat_map(|(i, p)| {
                        std::iter::repeat(i).take((p.health_score as usize / 20).max(1))
                    })
                    .collect();
                let cursor = self.rr_cursor.fetch_add(1, Ordering::Relaxed);
                let i = slots[cursor % slots.len()];
                candidates.into_iter().nth(i)
            }
        };

        if let Some(peer) = &chosen {
            trace!(peer = %peer.node_id, strategy = ?self.strategy, "peer selected");
        }
        chosen
    }

    /// All eligible peers, best first (for fan-out).
    pub fn eligible(&self) -> Vec<PeerSnapshot> {
        self.monitor.eligible()
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerNetConfig;
    use crate::health::ProbeOutcome;

    fn monitor_with_peers() -> Arc<HealthMonitor> {
        let monitor = Arc::new(HealthMonitor::new(&PeerNetConfig::default()));
        monitor.register("fast", "http://fast");
        monitor.register("slow", "http://slow");
        monitor.register("dead", "http://dead");
        for _ in 0..10 {
            monitor.record("fast", ProbeOutcome { success: true, response_ms: 50 }, 100);
            monitor.record(
                "slow",
                ProbeOutcome { success: true, response_ms: 2_500 },
                100,
            );
            monitor.record("dead", ProbeOutcome { success: false, response_ms: 100 }, 100);
        }
        monitor
    }

    #[test]
    fn test_health_based_picks_best() {
        let lb = LoadBalancer::new(monitor_with_peers(), SelectionStrategy::HealthBased);
        assert_eq!(lb.select(&[]).unwrap().node_id, "fast");
    }

    #[test]
    fn test_exclusion_falls_through() {
        let lb = LoadBalancer::new(monitor_with_peers(), SelectionStrategy::HealthBased);
        let picked = lb.select(&["fast".to_string()]).unwrap();
        assert_eq!(picked.node_id, "slow");
    }

    #[test]
    fn test_unhealthy_never_selected() {
        let lb = LoadBalancer::new(monitor_with_peers(), SelectionStrategy::Random);
        for _ in 0..50 {
            assert_ne!(lb.select(&[]).unwrap().node_id, "dead");
        }
    }

    #[test]
    fn test_no_candidates() {
        let lb = LoadBalancer::new(monitor_with_peers(), SelectionStrategy::HealthBased);
        assert!(lb
            .select(&["fast".to_string(), "slow".to_string()])
            .is_none());
    }

    #[test]
    fn test_least_connections() {
        let monitor = monitor_with_peers();
        monitor.connection_started("fast");
        monitor.connection_started("fast");
        let lb = LoadBalancer::new(monitor, SelectionStrategy::LeastConnections);
        assert_eq!(lb.select(&[]).unwrap().node_id, "slow");
    }

    #[test]
    fn test_weighted_round_robin_visits_both() {
        let lb = LoadBalancer::new(monitor_with_peers(), SelectionStrategy::WeightedRoundRobin);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..20 {
            seen.insert(lb.select(&[]).unwrap().node_id);
        }
        assert!(seen.contains("fast"));
        assert!(seen.contains("slow"));
    }
}
