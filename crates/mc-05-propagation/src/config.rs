//! Propagation configuration.

use std::time::Duration;

/// Tunables for the fan-out and ingress pipelines.
#[derive(Debug, Clone)]
pub struct PropagationConfig {
    /// This node's identifier, stamped on every envelope.
    pub node_id: String,
    /// Pre-shared broadcast secret. `None` disables signing and the
    /// receiver-side signature requirement.
    pub broadcast_secret: Option<Vec<u8>>,
    /// Maximum concurrent outbound deliveries.
    pub fanout_concurrency: usize,
    /// Bodies larger than this are gzip+base64 encoded.
    pub compress_threshold: usize,
    /// Sustained events per minute accepted per source.
    pub rate_limit_per_minute: u32,
    /// Burst capacity per source.
    pub rate_limit_burst: u32,
    /// Dedup entry time-to-live.
    pub dedup_ttl: Duration,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            node_id: String::from("node-unconfigured"),
            broadcast_secret: None,
            fanout_concurrency: 8,
            compress_threshold: 32 * 1024,
            rate_limit_per_minute: 60,
            rate_limit_burst: 10,
            dedup_ttl: Duration::from_secs(900),
        }
    }
}
