//! # Strategy Selection
//!
//! Chooses how to catch up based on the local tip, the best remote
//! height, and the available bootstrap material.

use serde::Serialize;

/// The four synchronization modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Pull every missing block in order.
    Full,
    /// Download a state snapshot, then pull blocks from there.
    Fast,
    /// Headers only, with SPV proofs for specific transactions.
    Light,
    /// Apply a trusted checkpoint, then full-sync from it.
    Checkpoint,
}

/// How a detected gap is resolved, by size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapResolution {
    /// Immediate sequential pulls.
    Sequential,
    /// Parallel batch download.
    ParallelBatch,
    /// Request the full range; consider switching to fast-sync.
    FullRange,
}

/// Inputs to the strategy decision.
#[derive(Debug, Clone, Copy)]
pub struct StrategyInputs {
    /// Local tip height; `None` for a fresh node.
    pub local_height: Option<u64>,
    /// Best height reported by peers.
    pub remote_max_height: u64,
    /// A trusted checkpoint exists in configuration.
    pub has_trusted_checkpoint: bool,
    /// A snapshot is available within the snapshot interval.
    pub snapshot_available: bool,
    /// The node runs in resource-constrained mode.
    pub resource_constrained: bool,
}

/// Pick the sync strategy.
pub fn choose_strategy(inputs: StrategyInputs) -> SyncStrategy {
    if inputs.resource_constrained {
        return SyncStrategy::Light;
    }
    match inputs.local_height {
        None | Some(0) if inputs.has_trusted_checkpoint => SyncStrategy::Checkpoint,
        None => SyncStrategy::Full,
        Some(local) => {
            let gap = inputs.remote_max_height.saturating_sub(local);
            if gap >= 100 && inputs.snapshot_available {
                SyncStrategy::Fast
            } else {
                SyncStrategy::Full
            }
        }
    }
}

/// Pick the gap resolution tier for a gap of `size` blocks.
pub fn resolution_for_gap(size: u64, sequential_limit: u64, batch_limit: u64) -> GapResolution {
    if size <= sequential_limit {
        GapResolution::Sequential
    } else if size <= batch_limit {
        GapResolution::ParallelBatch
    } else {
        GapResolution::FullRange
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(local: Option<u64>, remote: u64) -> StrategyInputs {
        StrategyInputs {
            local_height: local,
            remote_max_height: remote,
            has_trusted_checkpoint: false,
            snapshot_available: false,
            resource_constrained: false,
        }
    }

    #[test]
    fn test_small_gap_is_full() {
        assert_eq!(choose_strategy(inputs(Some(950), 1_000)), SyncStrategy::Full);
    }

    #[test]
    fn test_large_gap_with_snapshot_is_fast() {
        let mut i = inputs(Some(100), 900);
        i.snapshot_available = true;
        assert_eq!(choose_strategy(i), SyncStrategy::Fast);
        // Without a snapshot the gap is walked in full.
        i.snapshot_available = false;
        assert_eq!(choose_strategy(i), SyncStrategy::Full);
    }

    #[test]
    fn test_fresh_node_prefers_checkpoint() {
        let mut i = inputs(None, 10_000);
        i.has_trusted_checkpoint = true;
        assert_eq!(choose_strategy(i), SyncStrategy::Checkpoint);
        i.has_trusted_checkpoint = false;
        assert_eq!(choose_strategy(i), SyncStrategy::Full);
    }

    #[test]
    fn test_resource_constrained_is_light() {
        let mut i = inputs(Some(500), 10_000);
        i.resource_constrained = true;
        i.snapshot_available = true;
        assert_eq!(choose_strategy(i), SyncStrategy::Light);
    }

    #[test]
    fn test_gap_resolution_tiers() {
        assert_eq!(resolution_for_gap(1, 10, 100), GapResolution::Sequential);
        assert_eq!(resolution_for_gap(10, 10, 100), GapResolution::Sequential);
        assert_eq!(resolution_for_gap(11, 10, 100), GapResolution::ParallelBatch);
        assert_eq!(resolution_for_gap(100, 10, 100), GapResolution::ParallelBatch);
        assert_eq!(resolution_for_gap(101, 10, 100), GapResolution::FullRange);
    }
}
