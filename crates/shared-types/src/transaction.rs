//! # Transaction Model
//!
//! A transaction's hash is the SHA-256 of its canonical preimage, except
//! for transactions imported as externally-validated raw, which keep the
//! hash assigned by their origin chain. Signatures bind the sender to the
//! hash digest.

use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::entities::Address;
use crate::errors::ModelError;
use crate::ports::TransactionVerifier;
use crate::Hash;

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

/// A value transfer between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(with = "crate::hex0x::hash")]
    pub hash: Hash,
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub fee: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub gas_price: u64,
    pub nonce: u64,
    #[serde(with = "crate::hex0x::bytes")]
    pub data: Vec<u8>,
    #[serde(default, with = "crate::hex0x::opt_bytes")]
    pub signature: Option<Vec<u8>>,
    pub status: TxStatus,
    pub timestamp: u64,
    /// Imported with its original hash preserved; skips the canonical
    /// recomputation and the self-transfer rejection.
    #[serde(default)]
    pub external_raw: bool,
}

impl Transaction {
    /// Build an unsigned transaction with its canonical hash filled in.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        from: Address,
        to: Address,
        amount: u64,
        fee: u64,
        nonce: u64,
        gas_limit: u64,
        gas_price: u64,
        data: Vec<u8>,
        timestamp: u64,
    ) -> Self {
        let mut tx = Self {
            hash: [0u8; 32],
            from,
            to,
            amount,
            fee,
            gas_limit,
            gas_used: 0,
            gas_price,
            nonce,
            data,
            signature: None,
            status: TxStatus::Pending,
            timestamp,
            external_raw: false,
        };
        tx.hash = canonical::tx_hash(&tx);
        tx
    }

    /// Import a transaction validated elsewhere, preserving its hash.
    #[allow(clippy::too_many_arguments)]
    pub fn external_raw(
        hash: Hash,
        from: Address,
        to: Address,
        amount: u64,
        fee: u64,
        nonce: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            hash,
            from,
            to,
            amount,
            fee,
            gas_limit: 0,
            gas_used: 0,
            gas_price: 0,
            nonce,
            data: Vec::new(),
            signature: None,
            status: TxStatus::Pending,
            timestamp,
            external_raw: true,
        }
    }

    /// The digest the sender signs: the transaction hash.
    pub fn signing_digest(&self) -> Hash {
        self.hash
    }

    /// Recompute the canonical hash over the current field values.
    pub fn compute_hash(&self) -> Hash {
        canonical::tx_hash(self)
    }

    /// The total balance this transaction consumes from the sender.
    pub fn cost(&self) -> u64 {
        self.amount.saturating_add(self.fee)
    }

    /// Full structural and cryptographic validation.
    ///
    /// # Errors
    ///
    /// - `HashMismatch` when the stored hash diverges from the canonical
    ///   recomputation (non-external transactions only)
    /// - `SelfTransfer` for `from == to` (non-external only)
    /// - `MissingSignature` / `BadSignature` for signature faults
    pub fn validate(&self, verifier: &dyn TransactionVerifier) -> Result<(), ModelError> {
        if !self.external_raw {
            if self.from == self.to {
                return Err(ModelError::SelfTransfer);
            }
            if self.hash != self.compute_hash() {
                return Err(ModelError::HashMismatch);
            }
        }
        let signature = self.signature.as_deref().ok_or(ModelError::MissingSignature)?;
        if !verifier.verify(&self.signing_digest(), signature, &self.from) {
            return Err(ModelError::BadSignature);
        }
        Ok(())
    }
}
