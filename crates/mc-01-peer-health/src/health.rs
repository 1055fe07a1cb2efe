//! # Peer Health Monitor
//!
//! Rolling probe window per peer, folded into a 0–100 health score:
//!
//! ```text
//! score = 100 − slow-response (0–40)
//!             − low success rate (0–50)
//!             − current failure (0–10)
//!             − slow average (0–10)
//! ```
//!
//! Buckets: ≥80 healthy, ≥60 degraded, ≥20 unhealthy, else offline.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, warn};

use shared_types::NodeStatus;

use crate::config::PeerNetConfig;

/// Result of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub success: bool,
    pub response_ms: u64,
}

#[derive(Debug, Default)]
struct PeerHealth {
    url: String,
    window: VecDeque<ProbeOutcome>,
    consecutive_failures: u32,
    active_connections: u32,
    last_seen: u64,
}

/// Public snapshot of one peer's health.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PeerSnapshot {
    pub node_id: String,
    pub url: String,
    pub health_score: u8,
    pub status: NodeStatus,
    pub active_connections: u32,
    pub last_seen: u64,
}

/// Concurrent peer health table. Updates are single-writer per peer
/// (the prober), reads are lock-free snapshots.
pub struct HealthMonitor {
    peers: DashMap<String, PeerHealth>,
    window: usize,
}

impl HealthMonitor {
    pub fn new(config: &PeerNetConfig) -> Self {
        Self {
            peers: DashMap::new(),
            window: config.probe_window,
        }
    }

    /// Register a peer. Existing entries keep their history.
    pub fn register(&self, node_id: &str, url: &str) {
        self.peers.entry(node_id.to_string()).or_insert_with(|| PeerHealth {
            url: url.to_string(),
            ..Default::default()
        });
    }

    pub fn forget(&self, node_id: &str) {
        self.peers.remove(node_id);
    }

    /// Record a probe (or any request outcome) for `node_id`.
    pub fn record(&self, node_id: &str, outcome: ProbeOutcome, now: u64) {
        let mut peer = match self.peers.get_mut(node_id) {
            Some(peer) => peer,
            None => {
                warn!(node_id, "outcome for unknown peer ignored");
                return;
            }
        };
        if peer.window.len() >= self.window {
            peer.window.pop_front();
        }
        peer.window.push_back(outcome);
        if outcome.success {
            peer.consecutive_failures = 0;
            peer.last_seen = now;
        } else {
            peer.consecutive_failures += 1;
        }
        debug!(node_id, success = outcome.success, ms = outcome.response_ms, "probe recorded");
    }

    /// Mark a peer as alive without a timed probe (heartbeat receipt).
    pub fn touch(&self, node_id: &str, now: u64) {
        if let Some(mut peer) = self.peers.get_mut(node_id) {
            peer.last_seen = now;
        }
    }

    pub fn connection_started(&self, node_id: &str) {
        if let Some(mut peer) = self.peers.get_mut(node_id) {
            peer.active_connections += 1;
        }
    }

    pub fn connection_finished(&self, node_id: &str) {
        if let Some(mut peer) = self.peers.get_mut(node_id) {
            peer.active_connections = peer.active_connections.saturating_sub(1);
        }
    }

    fn score(peer: &PeerHealth) -> u8 {
        if peer.window.is_empty() {
            // Unprobed peers are optimistically healthy.
            return 100;
        }

        let mut penalty = 0u32;

        // Slow last response: 0–40.
        let last = peer.window.back().copied().unwrap_or(ProbeOutcome {
            success: false,
            response_ms: 0,
        });
        let slow = last.response_ms.saturating_sub(200) / 100;
        penalty += (slow as u32).min(40);

        // Low success rate over the window: 0–50.
        let successes = peer.window.iter().filter(|o| o.success).count() as u32;
        let rate = successes * 100 / peer.window.len() as u32;
        penalty += (100 - rate) / 2;

        // Currently failing: 0–10.
        if peer.consecutive_failures > 0 {
            penalty += 10;
        }

        // Slow average: 0–10.
        let avg = peer.window.iter().map(|o| o.response_ms).sum::<u64>() / peer.window.len() as u64;
        if avg > 1_000 {
            penalty += 10;
        }

        100u32.saturating_sub(penalty) as u8
    }

    fn bucket(score: u8) -> NodeStatus {
        match score {
            80..=100 => NodeStatus::Healthy,
            60..=79 => NodeStatus::Degraded,
            20..=59 => NodeStatus::Unhealthy,
            _ => NodeStatus::Offline,
        }
    }

    /// Snapshot one peer.
    pub fn snapshot(&self, node_id: &str) -> Option<PeerSnapshot> {
        self.peers.get(node_id).map(|peer| {
            let score = Self::score(&peer);
            PeerSnapshot {
                node_id: node_id.to_string(),
                url: peer.url.clone(),
                health_score: score,
                status: Self::bucket(score),
                active_connections: peer.active_connections,
                last_seen: peer.last_seen,
            }
        })
    }

    /// Snapshot every peer.
    pub fn snapshot_all(&self) -> Vec<PeerSnapshot> {
        let mut all: Vec<PeerSnapshot> = self
            .peers
            .iter()
            .map(|entry| {
                let score = Self::score(entry.value());
                PeerSnapshot {
                    node_id: entry.key().clone(),
                    url: entry.value().url.clone(),
                    health_score: score,
                    status: Self::bucket(score),
                    active_connections: entry.value().active_connections,
                    last_seen: entry.value().last_seen,
                }
            })
            .collect();
        all.sort_by(|a, b| b.health_score.cmp(&a.health_score));
        all
    }

    /// Peers eligible for routing: healthy ∪ degraded, best first.
    pub fn eligible(&self) -> Vec<PeerSnapshot> {
        self.snapshot_all()
            .into_iter()
            .filter(|p| matches!(p.status, NodeStatus::Healthy | NodeStatus::Degraded))
            .collect()
    }

    /// Fraction of peers currently reachable (healthy or degraded).
    pub fn reachability_ratio(&self) -> f64 {
        let all = self.snapshot_all();
        if all.is_empty() {
            return 1.0;
        }
        self.eligible().len() as f64 / all.len() as f64
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

/// Probe one peer's health endpoint, timing the round trip.
pub async fn probe_peer(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> ProbeOutcome {
    let started = std::time::Instant::now();
    let result = tokio::time::timeout(timeout, client.get(format!("{url}/health")).send()).await;
    let response_ms = started.elapsed().as_millis() as u64;
    let success = matches!(result, Ok(Ok(ref resp)) if resp.status().is_success());
    ProbeOutcome {
        success,
        response_ms,
    }
}

/// One probe round over every registered peer.
pub async fn probe_all(
    monitor: &Arc<HealthMonitor>,
    client: &reqwest::Client,
    timeout: Duration,
    now: u64,
) {
    let targets: Vec<(String, String)> = monitor
        .peers
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().url.clone()))
        .collect();
    for (node_id, url) in targets {
        let outcome = probe_peer(client, &url, timeout).await;
        monitor.record(&node_id, outcome, now);
    }
}
