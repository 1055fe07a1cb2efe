//! Chain store error types.

use shared_types::{Hash, ModelError};
use thiserror::Error;

/// Errors from the binary chain store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Appended block's parent hash does not match the current tip.
    #[error("previous hash mismatch: block at height {height} does not extend the tip")]
    PreviousHashMismatch { height: u64 },

    /// The block fails its own structural invariants.
    #[error("invalid block: {0}")]
    InvalidBlock(#[from] ModelError),

    /// No block at this height.
    #[error("no block at height {height}")]
    NotFound { height: u64 },

    /// No block with this hash.
    #[error("no block with hash 0x{}", hex::encode(.hash))]
    HashNotFound { hash: Hash },

    /// Underlying I/O fault.
    #[error("write error: {0}")]
    WriteError(#[from] std::io::Error),

    /// File header is not a chain file or has an unsupported version.
    #[error("bad chain file header: {reason}")]
    BadHeader { reason: String },

    /// A record failed its CRC or could not be decoded.
    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    /// Record payload exceeds the configured maximum.
    #[error("record of {size} bytes exceeds maximum {max}")]
    RecordTooLarge { size: usize, max: usize },

    /// Another process holds the store lock.
    #[error("chain store is locked by another process")]
    Locked,

    /// Encryption key missing for an encrypted record.
    #[error("record is encrypted but no key is configured")]
    MissingKey,

    /// Backup or restore failed integrity verification.
    #[error("backup integrity failure: {0}")]
    BackupIntegrity(String),
}

impl StoreError {
    /// Whether this error indicates on-disk corruption, which must push
    /// the node into recovery.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::BadHeader { .. } | StoreError::CorruptRecord { .. }
        )
    }
}
