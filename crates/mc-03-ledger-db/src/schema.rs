//! # Tables and Row Types
//!
//! Each table is a RocksDB column family. Keys:
//!
//! | Table | Key |
//! |-------|-----|
//! | `blocks` | height, u64 big-endian |
//! | `block_hash_index` | canonical block hash string |
//! | `transactions` | canonical tx hash string |
//! | `wallets` / `validators` / `staking` / `smart_contracts` | address string |
//! | `mempool` | canonical tx hash string |
//! | `nodes` | node id |
//! | `monitoring` / `sync_log` | sequence, u64 big-endian |
//! | `config` / `users` | plain string |
//!
//! Hash-keyed tables normalize keys to the lowercase `0x` form; reads
//! fall back to the bare legacy form for rows written before the
//! convention settled.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use shared_types::{Address, Block, Hash, Transaction, TxStatus};

/// All column families, in open order.
pub const ALL_TABLES: &[&str] = &[
    TABLE_BLOCKS,
    TABLE_BLOCK_HASH_INDEX,
    TABLE_TRANSACTIONS,
    TABLE_WALLETS,
    TABLE_VALIDATORS,
    TABLE_STAKING,
    TABLE_CONTRACTS,
    TABLE_MEMPOOL,
    TABLE_NODES,
    TABLE_MONITORING,
    TABLE_SYNC_LOG,
    TABLE_CONFIG,
    TABLE_USERS,
];

pub const TABLE_BLOCKS: &str = "blocks";
pub const TABLE_BLOCK_HASH_INDEX: &str = "block_hash_index";
pub const TABLE_TRANSACTIONS: &str = "transactions";
pub const TABLE_WALLETS: &str = "wallets";
pub const TABLE_VALIDATORS: &str = "validators";
pub const TABLE_STAKING: &str = "staking";
pub const TABLE_CONTRACTS: &str = "smart_contracts";
pub const TABLE_MEMPOOL: &str = "mempool";
pub const TABLE_NODES: &str = "nodes";
pub const TABLE_MONITORING: &str = "monitoring";
pub const TABLE_SYNC_LOG: &str = "sync_log";
pub const TABLE_CONFIG: &str = "config";
pub const TABLE_USERS: &str = "users";

/// Tables that participate in cross-node export/import. Local tables
/// (`config`, `monitoring`, `sync_log`, `users`) never do.
pub const GLOBAL_TABLES: &[&str] = &[
    TABLE_BLOCKS,
    TABLE_BLOCK_HASH_INDEX,
    TABLE_TRANSACTIONS,
    TABLE_WALLETS,
    TABLE_VALIDATORS,
    TABLE_STAKING,
    TABLE_CONTRACTS,
    TABLE_MEMPOOL,
    TABLE_NODES,
];

/// Config keys used by the node.
pub mod config_keys {
    pub const SCHEMA_VERSION: &str = "system.schema_version";
    pub const LAST_SYNC_TIMESTAMP: &str = "system.last_sync_timestamp";
    pub const BROADCAST_SECRET: &str = "network.broadcast_secret";
}

/// Current schema version written on open.
pub const SCHEMA_VERSION: &str = "1";

/// Height key encoding.
pub fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

/// A block's relational row. Transactions live in their own table; the
/// row carries the hash list needed to reassemble the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRow {
    pub height: u64,
    #[serde(with = "shared_types::hex0x::hash")]
    pub hash: Hash,
    #[serde(with = "shared_types::hex0x::hash")]
    pub parent_hash: Hash,
    #[serde(with = "shared_types::hex0x::hash")]
    pub merkle_root: Hash,
    pub timestamp: u64,
    pub validator: Address,
    #[serde(default, with = "shared_types::hex0x::opt_bytes")]
    pub signature: Option<Vec<u8>>,
    pub tx_count: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub tx_hashes: Vec<String>,
    /// Set when a fork resolution orphaned this row.
    #[serde(default)]
    pub orphaned: bool,
}

impl BlockRow {
    pub fn from_block(block: &Block) -> Self {
        Self {
            height: block.height,
            hash: block.hash,
            parent_hash: block.parent_hash,
            merkle_root: block.merkle_root,
            timestamp: block.timestamp,
            validator: block.validator,
            signature: block.signature.clone(),
            tx_count: block.tx_count,
            metadata: block.metadata.clone(),
            tx_hashes: block
                .transactions
                .iter()
                .map(|tx| shared_types::normalize::format_hash(&tx.hash))
                .collect(),
            orphaned: false,
        }
    }

    /// Reassemble the full block from this row and its transactions.
    pub fn into_block(self, transactions: Vec<Transaction>) -> Block {
        Block {
            height: self.height,
            hash: self.hash,
            parent_hash: self.parent_hash,
            merkle_root: self.merkle_root,
            timestamp: self.timestamp,
            validator: self.validator,
            signature: self.signature,
            tx_count: self.tx_count,
            metadata: self.metadata,
            transactions,
        }
    }
}

/// A transaction's relational row with its confirmation linkage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRow {
    pub transaction: Transaction,
    /// Height of the including block, once confirmed.
    pub block_height: Option<u64>,
    /// Position within the including block.
    pub block_index: Option<u32>,
}

impl TxRow {
    pub fn pending(transaction: Transaction) -> Self {
        Self {
            transaction,
            block_height: None,
            block_index: None,
        }
    }

    pub fn confirmed(mut transaction: Transaction, height: u64, index: u32) -> Self {
        transaction.status = TxStatus::Confirmed;
        Self {
            transaction,
            block_height: Some(height),
            block_index: Some(index),
        }
    }
}

/// A persisted mempool entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MempoolRow {
    pub transaction: Transaction,
    pub priority_score: u128,
    pub arrival_time: u64,
    pub expires_at: u64,
    pub retry_count: u32,
}

/// An append-only monitoring or sync-log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringRow {
    pub seq: u64,
    /// Incident kind, e.g. `alert_raised`, `gap_detected`, `fork_resolved`.
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub timestamp: u64,
}
