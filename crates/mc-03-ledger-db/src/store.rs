//! # Ledger Database
//!
//! Column-family-per-table RocksDB wrapper. Every multi-row mutation
//! driven by a single block goes through one `WriteBatch`.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use rocksdb::{ColumnFamily, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use shared_types::{
    normalize, Address, Block, ContractState, Hash, NodeRecord, StakeRecord, Transaction,
    TxStatus, Validator, WalletAccount,
};

use crate::errors::LedgerError;
use crate::schema::{
    config_keys, height_key, BlockRow, MempoolRow, MonitoringRow, TxRow, ALL_TABLES,
    SCHEMA_VERSION, TABLE_BLOCKS, TABLE_BLOCK_HASH_INDEX, TABLE_CONFIG, TABLE_CONTRACTS,
    TABLE_MEMPOOL, TABLE_MONITORING, TABLE_NODES, TABLE_STAKING, TABLE_SYNC_LOG,
    TABLE_TRANSACTIONS, TABLE_VALIDATORS, TABLE_WALLETS,
};

/// The relational ledger projection.
pub struct LedgerDb {
    db: DB,
    monitoring_seq: AtomicU64,
    sync_log_seq: AtomicU64,
}

impl LedgerDb {
    /// Open (or create) the database with all column families.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, ALL_TABLES)?;
        let ledger = Self {
            db,
            monitoring_seq: AtomicU64::new(0),
            sync_log_seq: AtomicU64::new(0),
        };

        let next_monitoring = ledger.last_seq(TABLE_MONITORING)?.map_or(0, |s| s + 1);
        let next_sync = ledger.last_seq(TABLE_SYNC_LOG)?.map_or(0, |s| s + 1);
        ledger.monitoring_seq.store(next_monitoring, Ordering::SeqCst);
        ledger.sync_log_seq.store(next_sync, Ordering::SeqCst);

        if ledger.get_config(config_keys::SCHEMA_VERSION)?.is_none() {
            ledger.set_config(config_keys::SCHEMA_VERSION, SCHEMA_VERSION)?;
        }
        info!(path = %path.display(), "ledger database opened");
        Ok(ledger)
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, LedgerError> {
        self.db.cf_handle(name).ok_or(LedgerError::MissingTable(name))
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        table: &'static str,
        key: &[u8],
    ) -> Result<Option<T>, LedgerError> {
        let cf = self.cf(table)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        table: &'static str,
        key: &[u8],
        value: &T,
    ) -> Result<(), LedgerError> {
        let cf = self.cf(table)?;
        self.db.put_cf(cf, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn scan_json<T: DeserializeOwned>(&self, table: &'static str) -> Result<Vec<T>, LedgerError> {
        let cf = self.cf(table)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    fn last_seq(&self, table: &'static str) -> Result<Option<u64>, LedgerError> {
        let cf = self.cf(table)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                let bytes: [u8; 8] = key.as_ref().try_into().unwrap_or([0u8; 8]);
                Ok(Some(u64::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Insert a block, its transactions, and wallet updates atomically.
    ///
    /// Duplicate blocks (same hash) are a no-op. Heights must extend the
    /// current maximum; the first insert may start anywhere (snapshot
    /// bootstrap).
    pub fn commit_block(
        &self,
        block: &Block,
        wallets: &[WalletAccount],
    ) -> Result<(), LedgerError> {
        let canonical = normalize::format_hash(&block.hash);
        if self.height_of_hash(&block.hash)?.is_some() {
            debug!(height = block.height, "block already projected; skipping");
            return Ok(());
        }
        if let Some(max) = self.max_height()? {
            if block.height != max + 1 {
                return Err(LedgerError::OrderingViolation {
                    expected: max + 1,
                    actual: block.height,
                });
            }
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(TABLE_BLOCKS)?,
            height_key(block.height),
            serde_json::to_vec(&BlockRow::from_block(block))?,
        );
        batch.put_cf(
            self.cf(TABLE_BLOCK_HASH_INDEX)?,
            canonical.as_bytes(),
            height_key(block.height),
        );

        let tx_cf = self.cf(TABLE_TRANSACTIONS)?;
        let mempool_cf = self.cf(TABLE_MEMPOOL)?;
        for (index, tx) in block.transactions.iter().enumerate() {
            let key = normalize::format_hash(&tx.hash);
            let row = TxRow::confirmed(tx.clone(), block.height, index as u32);
            batch.put_cf(tx_cf, key.as_bytes(), serde_json::to_vec(&row)?);
            // Included transactions leave the persisted mempool in the
            // same atomic step.
            batch.delete_cf(mempool_cf, key.as_bytes());
            batch.delete_cf(mempool_cf, key.trim_start_matches("0x").as_bytes());
        }

        let wallet_cf = self.cf(TABLE_WALLETS)?;
        for wallet in wallets {
            batch.put_cf(
                wallet_cf,
                wallet.address.to_string().as_bytes(),
                serde_json::to_vec(wallet)?,
            );
        }

        self.db.write(batch)?;
        debug!(height = block.height, txs = block.tx_count, "block projected");
        Ok(())
    }

    /// Insert a block without wallet changes (projection-only import).
    pub fn insert_block(&self, block: &Block) -> Result<(), LedgerError> {
        self.commit_block(block, &[])
    }

    pub fn get_block_row(&self, height: u64) -> Result<Option<BlockRow>, LedgerError> {
        self.get_json(TABLE_BLOCKS, &height_key(height))
    }

    /// Reassemble the full block at `height`.
    pub fn get_block(&self, height: u64) -> Result<Option<Block>, LedgerError> {
        let Some(row) = self.get_block_row(height)? else {
            return Ok(None);
        };
        let mut transactions = Vec::with_capacity(row.tx_hashes.len());
        for hash in &row.tx_hashes {
            match self.get_transaction(hash)? {
                Some(tx_row) => transactions.push(tx_row.transaction),
                None => {
                    return Err(LedgerError::NotFound(format!(
                        "transaction {hash} referenced by block {height}"
                    )))
                }
            }
        }
        Ok(Some(row.into_block(transactions)))
    }

    /// Height of the block with `hash`, if projected.
    pub fn height_of_hash(&self, hash: &Hash) -> Result<Option<u64>, LedgerError> {
        let cf = self.cf(TABLE_BLOCK_HASH_INDEX)?;
        for key in normalize::lookup_forms(hash) {
            if let Some(bytes) = self.db.get_cf(cf, key.as_bytes())? {
                let arr: [u8; 8] = bytes.as_slice().try_into().unwrap_or([0u8; 8]);
                return Ok(Some(u64::from_be_bytes(arr)));
            }
        }
        Ok(None)
    }

    /// Highest projected block height.
    pub fn max_height(&self) -> Result<Option<u64>, LedgerError> {
        let cf = self.cf(TABLE_BLOCKS)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                let arr: [u8; 8] = key.as_ref().try_into().unwrap_or([0u8; 8]);
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    /// Number of projected blocks.
    pub fn block_count(&self) -> Result<u64, LedgerError> {
        let cf = self.cf(TABLE_BLOCKS)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Remove all blocks above `height`, reverting their transactions to
    /// pending. Returns the removed rows, tip-first.
    pub fn rollback_to_height(&self, height: u64) -> Result<Vec<BlockRow>, LedgerError> {
        let Some(max) = self.max_height()? else {
            return Ok(Vec::new());
        };
        let mut removed = Vec::new();
        let mut batch = WriteBatch::default();

        for h in ((height + 1)..=max).rev() {
            let Some(row) = self.get_block_row(h)? else {
                continue;
            };
            batch.delete_cf(self.cf(TABLE_BLOCKS)?, height_key(h));
            batch.delete_cf(
                self.cf(TABLE_BLOCK_HASH_INDEX)?,
                normalize::format_hash(&row.hash).as_bytes(),
            );
            for hash in &row.tx_hashes {
                if let Some(mut tx_row) = self.get_transaction(hash)? {
                    tx_row.block_height = None;
                    tx_row.block_index = None;
                    tx_row.transaction.status = TxStatus::Pending;
                    batch.put_cf(
                        self.cf(TABLE_TRANSACTIONS)?,
                        normalize::normalize_hash(hash)?.as_bytes(),
                        serde_json::to_vec(&tx_row)?,
                    );
                }
            }
            removed.push(row);
        }

        self.db.write(batch)?;
        if !removed.is_empty() {
            warn!(from = max, to = height, removed = removed.len(), "ledger rolled back");
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Insert or replace a transaction row by canonical hash.
    pub fn upsert_transaction(&self, row: &TxRow) -> Result<(), LedgerError> {
        let key = normalize::format_hash(&row.transaction.hash);
        self.put_json(TABLE_TRANSACTIONS, key.as_bytes(), row)
    }

    /// Look up a transaction by hash string, trying the canonical form
    /// first and the bare legacy form second.
    pub fn get_transaction(&self, hash: &str) -> Result<Option<TxRow>, LedgerError> {
        let canonical = normalize::normalize_hash(hash)?;
        if let Some(row) = self.get_json(TABLE_TRANSACTIONS, canonical.as_bytes())? {
            return Ok(Some(row));
        }
        self.get_json(TABLE_TRANSACTIONS, canonical.trim_start_matches("0x").as_bytes())
    }

    /// Confirmed nonce of `address` (0 when unknown).
    pub fn confirmed_nonce(&self, address: &Address) -> Result<u64, LedgerError> {
        Ok(self.get_wallet(address)?.map(|w| w.nonce).unwrap_or(0))
    }

    // ------------------------------------------------------------------
    // Wallets / validators / staking / contracts
    // ------------------------------------------------------------------

    pub fn upsert_wallet(&self, wallet: &WalletAccount) -> Result<(), LedgerError> {
        self.put_json(TABLE_WALLETS, wallet.address.to_string().as_bytes(), wallet)
    }

    pub fn get_wallet(&self, address: &Address) -> Result<Option<WalletAccount>, LedgerError> {
        self.get_json(TABLE_WALLETS, address.to_string().as_bytes())
    }

    pub fn wallets(&self) -> Result<Vec<WalletAccount>, LedgerError> {
        self.scan_json(TABLE_WALLETS)
    }

    pub fn upsert_validator(&self, validator: &Validator) -> Result<(), LedgerError> {
        self.put_json(TABLE_VALIDATORS, validator.address.to_string().as_bytes(), validator)
    }

    pub fn get_validator(&self, address: &Address) -> Result<Option<Validator>, LedgerError> {
        self.get_json(TABLE_VALIDATORS, address.to_string().as_bytes())
    }

    pub fn validators(&self) -> Result<Vec<Validator>, LedgerError> {
        self.scan_json(TABLE_VALIDATORS)
    }

    pub fn upsert_stake(&self, stake: &StakeRecord) -> Result<(), LedgerError> {
        self.put_json(TABLE_STAKING, stake.address.to_string().as_bytes(), stake)
    }

    pub fn stakes(&self) -> Result<Vec<StakeRecord>, LedgerError> {
        self.scan_json(TABLE_STAKING)
    }

    pub fn upsert_contract(&self, contract: &ContractState) -> Result<(), LedgerError> {
        self.put_json(TABLE_CONTRACTS, contract.address.to_string().as_bytes(), contract)
    }

    pub fn get_contract(&self, address: &Address) -> Result<Option<ContractState>, LedgerError> {
        self.get_json(TABLE_CONTRACTS, address.to_string().as_bytes())
    }

    pub fn contracts(&self) -> Result<Vec<ContractState>, LedgerError> {
        self.scan_json(TABLE_CONTRACTS)
    }

    // ------------------------------------------------------------------
    // Mempool rows
    // ------------------------------------------------------------------

    pub fn put_mempool_row(&self, row: &MempoolRow) -> Result<(), LedgerError> {
        let key = normalize::format_hash(&row.transaction.hash);
        self.put_json(TABLE_MEMPOOL, key.as_bytes(), row)
    }

    pub fn delete_mempool_row(&self, hash: &Hash) -> Result<(), LedgerError> {
        let cf = self.cf(TABLE_MEMPOOL)?;
        for key in normalize::lookup_forms(hash) {
            self.db.delete_cf(cf, key.as_bytes())?;
        }
        Ok(())
    }

    pub fn mempool_rows(&self) -> Result<Vec<MempoolRow>, LedgerError> {
        self.scan_json(TABLE_MEMPOOL)
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    pub fn upsert_node(&self, node: &NodeRecord) -> Result<(), LedgerError> {
        self.put_json(TABLE_NODES, node.node_id.as_bytes(), node)
    }

    pub fn get_node(&self, node_id: &str) -> Result<Option<NodeRecord>, LedgerError> {
        self.get_json(TABLE_NODES, node_id.as_bytes())
    }

    pub fn nodes(&self) -> Result<Vec<NodeRecord>, LedgerError> {
        self.scan_json(TABLE_NODES)
    }

    // ------------------------------------------------------------------
    // Monitoring and sync log (append-only, local)
    // ------------------------------------------------------------------

    /// Append a monitoring incident, returning its sequence number.
    pub fn append_monitoring(
        &self,
        kind: &str,
        message: &str,
        details: serde_json::Value,
        timestamp: u64,
    ) -> Result<u64, LedgerError> {
        let seq = self.monitoring_seq.fetch_add(1, Ordering::SeqCst);
        let row = MonitoringRow {
            seq,
            kind: kind.to_string(),
            message: message.to_string(),
            details,
            timestamp,
        };
        self.put_json(TABLE_MONITORING, &height_key(seq), &row)?;
        Ok(seq)
    }

    /// The most recent monitoring rows, newest first.
    pub fn recent_monitoring(&self, limit: usize) -> Result<Vec<MonitoringRow>, LedgerError> {
        let cf = self.cf(TABLE_MONITORING)?;
        let mut rows = Vec::with_capacity(limit);
        for item in self.db.iterator_cf(cf, IteratorMode::End).take(limit) {
            let (_, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    /// Append a sync-log row, returning its sequence number.
    pub fn append_sync_log(
        &self,
        kind: &str,
        message: &str,
        details: serde_json::Value,
        timestamp: u64,
    ) -> Result<u64, LedgerError> {
        let seq = self.sync_log_seq.fetch_add(1, Ordering::SeqCst);
        let row = MonitoringRow {
            seq,
            kind: kind.to_string(),
            message: message.to_string(),
            details,
            timestamp,
        };
        self.put_json(TABLE_SYNC_LOG, &height_key(seq), &row)?;
        Ok(seq)
    }

    // ------------------------------------------------------------------
    // Config (local)
    // ------------------------------------------------------------------

    pub fn set_config(&self, key: &str, value: &str) -> Result<(), LedgerError> {
        let cf = self.cf(TABLE_CONFIG)?;
        self.db.put_cf(cf, key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>, LedgerError> {
        let cf = self.cf(TABLE_CONFIG)?;
        Ok(self
            .db
            .get_cf(cf, key.as_bytes())?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Wipe every global table. Local tables (config, monitoring, sync
    /// log, users) survive. Used before a reset from the binary store.
    pub fn clear_global_tables(&self) -> Result<(), LedgerError> {
        for table in crate::schema::GLOBAL_TABLES {
            let cf = self
                .db
                .cf_handle(table)
                .ok_or(LedgerError::MissingTable("global"))?;
            let keys: Vec<Box<[u8]>> = self
                .db
                .iterator_cf(cf, IteratorMode::Start)
                .filter_map(|item| item.ok())
                .map(|(key, _)| key)
                .collect();
            for key in keys {
                self.db.delete_cf(cf, key)?;
            }
        }
        warn!("global ledger tables cleared");
        Ok(())
    }
}
