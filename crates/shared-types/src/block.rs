//! # Block Model
//!
//! A block commits to its ordered transaction list through a merkle root
//! and to its position in the chain through the parent hash. Blocks are
//! immutable once appended.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::entities::Address;
use crate::errors::ModelError;
use crate::merkle;
use crate::transaction::Transaction;
use crate::{Hash, ZERO_HASH};

/// The header fields of a block, used by light sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: u64,
    #[serde(with = "crate::hex0x::hash")]
    pub hash: Hash,
    #[serde(with = "crate::hex0x::hash")]
    pub parent_hash: Hash,
    #[serde(with = "crate::hex0x::hash")]
    pub merkle_root: Hash,
    pub timestamp: u64,
    pub validator: Address,
}

/// A full block with its transaction list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    #[serde(with = "crate::hex0x::hash")]
    pub hash: Hash,
    #[serde(with = "crate::hex0x::hash")]
    pub parent_hash: Hash,
    #[serde(with = "crate::hex0x::hash")]
    pub merkle_root: Hash,
    pub timestamp: u64,
    pub validator: Address,
    #[serde(default, with = "crate::hex0x::opt_bytes")]
    pub signature: Option<Vec<u8>>,
    pub tx_count: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Assemble a block over `transactions`, computing the merkle root,
    /// the hash, and the transaction count. The block is returned unsigned.
    pub fn assemble(
        height: u64,
        parent_hash: Hash,
        timestamp: u64,
        validator: Address,
        transactions: Vec<Transaction>,
    ) -> Self {
        let mut block = Self {
            height,
            hash: ZERO_HASH,
            parent_hash,
            merkle_root: ZERO_HASH,
            timestamp,
            validator,
            signature: None,
            tx_count: transactions.len() as u32,
            metadata: BTreeMap::new(),
            transactions,
        };
        block.merkle_root = block.compute_merkle_root();
        block.hash = block.compute_hash();
        block
    }

    /// The genesis block: height 0, all-zero parent.
    pub fn genesis(timestamp: u64, validator: Address) -> Self {
        Self::assemble(0, ZERO_HASH, timestamp, validator, Vec::new())
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.parent_hash == ZERO_HASH
    }

    /// Recompute the canonical hash from the current field values.
    pub fn compute_hash(&self) -> Hash {
        canonical::block_hash(self)
    }

    /// Recompute the merkle root over the ordered transaction hashes.
    pub fn compute_merkle_root(&self) -> Hash {
        let leaves: Vec<Hash> = self.transactions.iter().map(|tx| tx.hash).collect();
        merkle::merkle_root(&leaves)
    }

    /// The header projection of this block.
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            height: self.height,
            hash: self.hash,
            parent_hash: self.parent_hash,
            merkle_root: self.merkle_root,
            timestamp: self.timestamp,
            validator: self.validator,
        }
    }

    /// Sum of transaction fees committed by this block.
    pub fn total_fees(&self) -> u64 {
        self.transactions.iter().fold(0u64, |acc, tx| acc.saturating_add(tx.fee))
    }

    /// Structural self-consistency: stored hash, merkle root, and count
    /// all match their recomputations.
    pub fn validate_structure(&self) -> Result<(), ModelError> {
        if self.merkle_root != self.compute_merkle_root() {
            return Err(ModelError::MerkleMismatch);
        }
        if self.hash != self.compute_hash() {
            return Err(ModelError::HashMismatch);
        }
        Ok(())
    }

    /// Linkage against the parent block: dense height, matching parent
    /// hash, strictly increasing timestamp.
    pub fn validate_linkage(&self, parent: &Block) -> Result<(), ModelError> {
        if self.height != parent.height + 1 {
            return Err(ModelError::NonSequentialHeight {
                parent: parent.height,
                actual: self.height,
            });
        }
        if self.parent_hash != parent.hash {
            return Err(ModelError::ParentHashMismatch { height: self.height });
        }
        if self.timestamp <= parent.timestamp {
            return Err(ModelError::TimestampNotIncreasing {
                parent: parent.timestamp,
                actual: self.timestamp,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(n: u64) -> Transaction {
        Transaction::new(
            Address([1; 20]),
            Address([2; 20]),
            n,
            1,
            n,
            21_000,
            1,
            vec![],
            1_700_000_000,
        )
    }

    #[test]
    fn test_genesis_shape() {
        let g = Block::genesis(1_700_000_000, Address([9; 20]));
        assert!(g.is_genesis());
        assert_eq!(g.merkle_root, ZERO_HASH);
        assert!(g.validate_structure().is_ok());
    }

    #[test]
    fn test_assemble_commits_to_transactions() {
        let block = Block::assemble(1, [1; 32], 1_700_000_100, Address([9; 20]), vec![tx(1), tx(2)]);
        assert_eq!(block.tx_count, 2);
        assert!(block.validate_structure().is_ok());

        let mut tampered = block.clone();
        tampered.transactions[0].amount = 777;
        tampered.transactions[0].hash = tampered.transactions[0].compute_hash();
        assert!(tampered.validate_structure().is_err());
    }

    #[test]
    fn test_linkage() {
        let parent = Block::genesis(1_700_000_000, Address([9; 20]));
        let child = Block::assemble(1, parent.hash, 1_700_000_100, Address([9; 20]), vec![]);
        assert!(child.validate_linkage(&parent).is_ok());
    }

    #[test]
    fn test_linkage_rejects_stale_timestamp() {
        let parent = Block::genesis(1_700_000_000, Address([9; 20]));
        let child = Block::assemble(1, parent.hash, 1_700_000_000, Address([9; 20]), vec![]);
        assert_eq!(
            child.validate_linkage(&parent),
            Err(ModelError::TimestampNotIncreasing {
                parent: 1_700_000_000,
                actual: 1_700_000_000
            })
        );
    }

    #[test]
    fn test_linkage_rejects_height_gap() {
        let parent = Block::genesis(1_700_000_000, Address([9; 20]));
        let child = Block::assemble(5, parent.hash, 1_700_000_100, Address([9; 20]), vec![]);
        assert!(matches!(
            child.validate_linkage(&parent),
            Err(ModelError::NonSequentialHeight { parent: 0, actual: 5 })
        ));
    }

    #[test]
    fn test_serde_round_trip_is_hash_stable() {
        let block = Block::assemble(3, [7; 32], 1_700_000_200, Address([9; 20]), vec![tx(4)]);
        let json = serde_json::to_vec(&block).unwrap();
        let back: Block = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, block);
        assert_eq!(back.compute_hash(), block.hash);
    }

    #[test]
    fn test_total_fees() {
        let block = Block::assemble(1, [1; 32], 2, Address([9; 20]), vec![tx(1), tx(2), tx(3)]);
        assert_eq!(block.total_fees(), 3);
    }
}
