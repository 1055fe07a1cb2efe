//! Sync configuration.

use std::time::Duration;

/// Tunables for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Gaps at or below this size are pulled sequentially.
    pub sequential_gap_limit: u64,
    /// Gaps at or below this size are pulled in parallel batches.
    pub batch_gap_limit: u64,
    /// Blocks per batch request.
    pub batch_size: u64,
    /// Concurrent batch downloads.
    pub batch_parallelism: usize,
    /// Blocks between snapshots; fast-sync needs one within this span.
    pub snapshot_interval: u64,
    /// Run in light (header-only) mode.
    pub resource_constrained: bool,
    /// Quorum fraction for fork confirmation.
    pub fork_quorum: f64,
    /// Weigh fork votes by stake instead of peer count.
    pub fork_quorum_by_stake: bool,
    /// Per-request timeout for block fetches.
    pub block_fetch_timeout: Duration,
    /// Timeout for snapshot downloads.
    pub snapshot_timeout: Duration,
    /// Timeout for a full batch.
    pub batch_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sequential_gap_limit: 10,
            batch_gap_limit: 100,
            batch_size: 25,
            batch_parallelism: 4,
            snapshot_interval: 1_000,
            resource_constrained: false,
            fork_quorum: 2.0 / 3.0,
            fork_quorum_by_stake: false,
            block_fetch_timeout: Duration::from_secs(10),
            snapshot_timeout: Duration::from_secs(300),
            batch_timeout: Duration::from_secs(30),
        }
    }
}
