//! # Canonical Serialization
//!
//! Every hashed structure has exactly one byte-level preimage. The writer
//! emits fixed-order fields: integers big-endian, fixed-width byte arrays
//! verbatim, and variable-length fields with a u32 length prefix.
//!
//! Preimage layouts:
//!
//! - transaction: `from ‖ to ‖ amount ‖ fee ‖ nonce ‖ gas_limit ‖
//!   gas_price ‖ data ‖ timestamp`
//! - block: `height ‖ timestamp ‖ parent_hash ‖ merkle_root ‖ tx hashes`

use sha2::{Digest, Sha256};

use crate::block::Block;
use crate::transaction::Transaction;
use crate::Hash;

/// Deterministic byte writer for hash preimages.
#[derive(Debug, Default)]
pub struct CanonicalWriter {
    buf: Vec<u8>,
}

impl CanonicalWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn fixed(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Variable-length field, u32 big-endian length prefix.
    pub fn var(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn digest(self) -> Hash {
        Sha256::digest(&self.buf).into()
    }
}

/// Canonical preimage of a transaction.
///
/// Field order is part of the wire contract and must never change.
pub fn tx_preimage(tx: &Transaction) -> Vec<u8> {
    let mut w = CanonicalWriter::new();
    w.fixed(tx.from.as_bytes())
        .fixed(tx.to.as_bytes())
        .u64(tx.amount)
        .u64(tx.fee)
        .u64(tx.nonce)
        .u64(tx.gas_limit)
        .u64(tx.gas_price)
        .var(&tx.data)
        .u64(tx.timestamp);
    w.finish()
}

/// The canonical transaction hash: SHA-256 of the preimage.
pub fn tx_hash(tx: &Transaction) -> Hash {
    Sha256::digest(tx_preimage(tx)).into()
}

/// Canonical preimage of a block: header fields followed by the ordered
/// transaction hash list.
pub fn block_preimage(block: &Block) -> Vec<u8> {
    let mut w = CanonicalWriter::new();
    w.u64(block.height)
        .u64(block.timestamp)
        .fixed(&block.parent_hash)
        .fixed(&block.merkle_root);
    for tx in &block.transactions {
        w.fixed(&tx.hash);
    }
    w.finish()
}

/// The canonical block hash: SHA-256 of the preimage.
pub fn block_hash(block: &Block) -> Hash {
    Sha256::digest(block_preimage(block)).into()
}
