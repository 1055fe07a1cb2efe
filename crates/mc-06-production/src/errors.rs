//! Production and validation error types.

use shared_types::{Address, ModelError};
use thiserror::Error;

/// Errors from producing or accepting blocks.
#[derive(Debug, Error)]
pub enum ProductionError {
    /// This node does not hold the slot at the target height.
    #[error("slot belongs to {chosen}")]
    NotOurSlot { chosen: Address },

    /// No active validator exists to choose from.
    #[error("validator set has no active members")]
    NoActiveValidators,

    /// The chain has no tip yet (genesis missing).
    #[error("chain has no tip")]
    NoTip,

    /// Structural or linkage fault in the block.
    #[error("invalid block: {0}")]
    InvalidBlock(#[from] ModelError),

    /// Block timestamp is ahead of local time plus allowed skew.
    #[error("block timestamp {timestamp} beyond local {now} + {skew}s")]
    TimestampBeyondSkew { timestamp: u64, now: u64, skew: u64 },

    /// Producer is not an active validator.
    #[error("producer {producer} is not active")]
    ProducerInactive { producer: Address },

    /// Producer does not match the slot assignment.
    #[error("producer {actual} does not match assigned {expected}")]
    ProducerMismatch { expected: Address, actual: Address },

    /// Block signature missing or failing verification.
    #[error("block signature invalid")]
    SignatureInvalid,

    /// A transaction failed validation inside the block.
    #[error("transaction {index} invalid: {reason}")]
    TransactionInvalid { index: usize, reason: String },

    /// A transaction violated balance or nonce rules on apply.
    #[error("state violation at transaction {index}: {reason}")]
    StateViolation { index: usize, reason: String },

    /// Binary store fault.
    #[error("chain store: {0}")]
    Store(#[from] mc_02_chain_store::StoreError),

    /// Relational store fault after the binary append; the projection
    /// must be re-imported from the chain file.
    #[error("ledger desync after append: {0}")]
    LedgerDesync(mc_03_ledger_db::LedgerError),

    /// Relational store fault before any write.
    #[error("ledger: {0}")]
    Ledger(#[from] mc_03_ledger_db::LedgerError),
}
