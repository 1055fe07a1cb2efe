//! Sync error types.

use thiserror::Error;

/// Errors from synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Peer networking fault (retried by the failover layer first).
    #[error("peer network: {0}")]
    PeerNet(#[from] mc_01_peer_health::PeerNetError),

    /// A downloaded block failed validation.
    #[error("downloaded block {height} rejected: {reason}")]
    BlockRejected { height: u64, reason: String },

    /// The remote returned a block sequence with holes.
    #[error("range {start}..={end} returned {got} blocks")]
    IncompleteRange { start: u64, end: u64, got: usize },

    /// Snapshot state root did not match its recomputation.
    #[error("snapshot at height {height} failed state-root verification")]
    SnapshotInvalid { height: u64 },

    /// Header chain failed continuity verification.
    #[error("header chain broken at height {height}")]
    HeaderChainBroken { height: u64 },

    /// No peer agreed on a common ancestor.
    #[error("no common ancestor found below height {height}")]
    NoCommonAncestor { height: u64 },

    /// Binary store fault.
    #[error("chain store: {0}")]
    Store(#[from] mc_02_chain_store::StoreError),

    /// Relational store fault.
    #[error("ledger: {0}")]
    Ledger(#[from] mc_03_ledger_db::LedgerError),

    /// Acceptance pipeline fault.
    #[error("apply: {0}")]
    Apply(#[from] mc_06_production::ProductionError),

    /// Snapshot decode fault.
    #[error("snapshot decode: {0}")]
    SnapshotDecode(String),

    /// The sync batch was cancelled; progress is preserved.
    #[error("sync cancelled at height {resume_from}")]
    Cancelled { resume_from: u64 },
}
