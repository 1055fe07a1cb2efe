//! # Dual-Store Reconciliation
//!
//! Keeps the binary chain file and the relational projection in
//! agreement. The binary store is the authority for committed history:
//! when the two disagree, the projection is rebuilt from the chain file.
//! Only global tables participate; local tables are never touched.

use rand::seq::SliceRandom;
use tracing::{info, warn};

use mc_02_chain_store::ChainStore;

use crate::errors::LedgerError;
use crate::state::StateView;
use crate::store::LedgerDb;

/// Outcome of a cross-store comparison.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CrossStoreReport {
    pub binary_blocks: u64,
    pub relational_blocks: u64,
    /// Heights whose (hash, merkle root) disagree between stores.
    pub mismatched_heights: Vec<u64>,
}

impl CrossStoreReport {
    pub fn is_consistent(&self) -> bool {
        self.binary_blocks == self.relational_blocks && self.mismatched_heights.is_empty()
    }
}

/// Bidirectional reconciliation between the chain file and the ledger.
pub struct DualStoreSync<'a> {
    chain: &'a ChainStore,
    ledger: &'a LedgerDb,
}

impl<'a> DualStoreSync<'a> {
    pub fn new(chain: &'a ChainStore, ledger: &'a LedgerDb) -> Self {
        Self { chain, ledger }
    }

    /// Project every binary block missing from the relational store,
    /// in height order, replaying wallet state as it goes. Duplicates
    /// (by hash) are skipped.
    pub fn export_binary_to_relational(&self) -> Result<u64, LedgerError> {
        let entries = self.chain.index_snapshot();
        let mut exported = 0u64;

        for entry in entries {
            if self.ledger.height_of_hash(&entry.hash)?.is_some() {
                continue;
            }
            let block = self
                .chain
                .get(entry.height)
                .map_err(|e| LedgerError::NotFound(format!("binary block {}: {e}", entry.height)))?;

            let mut view = StateView::over(self.ledger);
            if let Err(e) = view.apply_block_transactions(&block.transactions) {
                // History is committed; project the block but surface the
                // replay fault for the monitoring log.
                warn!(height = block.height, error = %e, "state replay fault during export");
            }
            let wallets = view.into_accounts();
            self.ledger.commit_block(&block, &wallets)?;
            exported += 1;
        }

        if exported > 0 {
            info!(exported, "binary blocks projected to the ledger");
        }
        Ok(exported)
    }

    /// Append relational blocks missing from the binary store, in height
    /// order. Aborts on the first ordering violation.
    pub fn export_relational_to_binary(&self) -> Result<u64, LedgerError> {
        let Some(max) = self.ledger.max_height()? else {
            return Ok(0);
        };
        let start = match self.chain.tip() {
            Some((tip_height, _)) => tip_height + 1,
            None => 0,
        };

        let mut exported = 0u64;
        for height in start..=max {
            let Some(block) = self.ledger.get_block(height)? else {
                warn!(height, "relational store has a gap; aborting export");
                break;
            };
            self.chain.append(&block).map_err(|e| {
                LedgerError::StateViolation {
                    address: String::new(),
                    reason: format!("binary append failed at {height}: {e}"),
                }
            })?;
            exported += 1;
        }

        if exported > 0 {
            info!(exported, "relational blocks appended to the chain file");
        }
        Ok(exported)
    }

    /// Compare block counts and a random sample of per-height
    /// (hash, merkle root) pairs.
    pub fn validate_cross_store(&self, sample_size: usize) -> Result<CrossStoreReport, LedgerError> {
        let entries = self.chain.index_snapshot();
        let mut report = CrossStoreReport {
            binary_blocks: entries.len() as u64,
            relational_blocks: self.ledger.block_count()?,
            mismatched_heights: Vec::new(),
        };

        let mut sampled: Vec<_> = entries.iter().collect();
        sampled.shuffle(&mut rand::thread_rng());
        sampled.truncate(sample_size);

        for entry in sampled {
            let binary = self
                .chain
                .get(entry.height)
                .map_err(|e| LedgerError::NotFound(format!("binary block {}: {e}", entry.height)))?;
            match self.ledger.get_block_row(entry.height)? {
                Some(row) if row.hash == binary.hash && row.merkle_root == binary.merkle_root => {}
                _ => report.mismatched_heights.push(entry.height),
            }
        }

        report.mismatched_heights.sort_unstable();
        Ok(report)
    }

    /// Rebuild the projection from the binary store: clear every global
    /// table, then export all blocks. Local tables survive.
    pub fn reset_from_binary(&self) -> Result<u64, LedgerError> {
        warn!("resetting relational projection from the binary store");
        self.ledger.clear_global_tables()?;
        let exported = self.export_binary_to_relational()?;
        self.ledger.append_monitoring(
            "projection_reset",
            "relational store rebuilt from binary chain",
            serde_json::json!({ "blocks": exported }),
            shared_types::clock::now_unix(),
        )?;
        Ok(exported)
    }

    /// Reconcile both directions, resetting the projection when the
    /// stores disagree on committed blocks. The binary store wins every
    /// disagreement.
    pub fn reconcile(&self, sample_size: usize) -> Result<CrossStoreReport, LedgerError> {
        if let Err(e) = self.export_binary_to_relational() {
            warn!(error = %e, "projection disagrees with committed history; resetting");
            self.reset_from_binary()?;
        }
        if let Err(e) = self.export_relational_to_binary() {
            warn!(error = %e, "relational blocks conflict with the chain file; resetting");
            self.reset_from_binary()?;
        }
        let report = self.validate_cross_store(sample_size)?;
        if !report.is_consistent() {
            warn!(
                mismatches = report.mismatched_heights.len(),
                "cross-store disagreement; binary store wins"
            );
            self.reset_from_binary()?;
            return self.validate_cross_store(sample_size);
        }
        Ok(report)
    }

    /// Record the reconciliation timestamp in the config table.
    pub fn record_sync_timestamp(&self, now: u64) -> Result<(), LedgerError> {
        self.ledger
            .set_config(crate::schema::config_keys::LAST_SYNC_TIMESTAMP, &now.to_string())
    }
}
