//! Mempool error types.

use shared_types::{Address, Hash, ModelError};
use thiserror::Error;

/// Mempool admission and maintenance errors.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MempoolError {
    /// Transaction already exists in the pool.
    #[error("duplicate transaction: {}", short_hash(.0))]
    DuplicateTransaction(Hash),

    /// Fee below the current admission floor.
    #[error("fee {fee} below minimum {minimum}")]
    FeeTooLow { fee: u64, minimum: u64 },

    /// Structural or signature validation failed.
    #[error("invalid transaction: {0}")]
    Invalid(#[from] ModelError),

    /// Nonce is not reachable from the confirmed nonce.
    #[error("nonce {nonce} not reachable for {address} (confirmed {confirmed})")]
    NonceNotReachable {
        address: Address,
        confirmed: u64,
        nonce: u64,
    },

    /// A different transaction already occupies `(sender, nonce)` and
    /// the replacement does not qualify.
    #[error("replacement fee {offered_fee} does not exceed existing fee {existing_fee}")]
    ReplacementUnderpriced { existing_fee: u64, offered_fee: u64 },

    /// Replacement signer differs from the original signer.
    #[error("replacement is not signed by the original sender")]
    ReplacementSignerMismatch,

    /// Sender has reached its pending-transaction limit.
    #[error("account {address} reached limit of {limit} transactions")]
    AccountLimitReached { address: Address, limit: usize },

    /// Transaction not found in the pool.
    #[error("transaction not found: {}", short_hash(.0))]
    TransactionNotFound(Hash),
}

fn short_hash(hash: &Hash) -> String {
    format!("0x{}", hex::encode(&hash[..4]))
}
