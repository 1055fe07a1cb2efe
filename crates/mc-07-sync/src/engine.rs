//! # Sync Engine
//!
//! Gap resolution and catch-up. Blocks apply strictly at
//! `local_height + 1`; downloads that arrive early wait in the pending
//! buffer. Batches are resumable: cancellation preserves the highest
//! contiguous applied height.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use mc_02_chain_store::ChainStore;
use mc_03_ledger_db::LedgerDb;
use mc_06_production::BlockValidator;
use shared_bus::{ChainEvent, EventBus};
use shared_types::{Block, Checkpoint, WalletAccount};

use crate::client::SyncClient;
use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::strategy::{choose_strategy, resolution_for_gap, GapResolution, StrategyInputs, SyncStrategy};

/// Outcome of one catch-up pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub strategy: SyncStrategy,
    pub applied: u64,
    pub tip_height: Option<u64>,
}

/// The synchronization worker.
pub struct SyncEngine {
    config: SyncConfig,
    chain: Arc<ChainStore>,
    ledger: Arc<LedgerDb>,
    validator: Arc<BlockValidator>,
    client: Arc<SyncClient>,
    bus: Arc<EventBus>,
    /// Downloaded blocks waiting for their height to become next.
    pending: Mutex<BTreeMap<u64, Block>>,
    cancel: AtomicBool,
    /// Trusted checkpoints from configuration.
    checkpoints: Vec<Checkpoint>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        chain: Arc<ChainStore>,
        ledger: Arc<LedgerDb>,
        validator: Arc<BlockValidator>,
        client: Arc<SyncClient>,
        bus: Arc<EventBus>,
        checkpoints: Vec<Checkpoint>,
    ) -> Self {
        Self {
            config,
            chain,
            ledger,
            validator,
            client,
            bus,
            pending: Mutex::new(BTreeMap::new()),
            cancel: AtomicBool::new(false),
            checkpoints,
        }
    }

    /// Request cancellation of the running batch. Progress up to the
    /// highest contiguous applied height is preserved.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    fn take_cancel(&self) -> bool {
        self.cancel.swap(false, Ordering::SeqCst)
    }

    fn local_height(&self) -> Option<u64> {
        self.chain.tip().map(|(height, _)| height)
    }

    /// React to a `block.added` announcement from a peer.
    ///
    /// In-order blocks with a payload apply immediately; a height gap
    /// emits `sync.gap_detected` and starts resolution.
    pub async fn handle_announcement(
        &self,
        block_height: u64,
        block: Option<Block>,
    ) -> Result<u64, SyncError> {
        let local = self.local_height();
        if let Some(local) = local {
            if block_height <= local {
                debug!(block_height, local, "stale announcement ignored");
                return Ok(0);
            }
        }

        let next = local.map_or(0, |h| h + 1);
        if block_height == next {
            if let Some(block) = block {
                self.validator.validate_and_apply(&block).await?;
                return Ok(1);
            }
        }

        let reported_local = local.unwrap_or(0);
        let gap_size = block_height - reported_local;
        self.bus
            .publish(ChainEvent::SyncGapDetected {
                local_height: reported_local,
                received_height: block_height,
                gap_size,
            })
            .await;
        self.ledger.append_sync_log(
            "gap_detected",
            "announced height ahead of local tip",
            serde_json::json!({ "local": reported_local, "received": block_height, "gap": gap_size }),
            shared_types::clock::now_unix(),
        )?;
        self.resolve_gap(local, block_height).await
    }

    /// Pull and apply everything after `local` up to `target`. A `None`
    /// local starts at genesis. Returns blocks applied.
    pub async fn resolve_gap(&self, local: Option<u64>, target: u64) -> Result<u64, SyncError> {
        let start = local.map_or(0, |h| h + 1);
        if start > target {
            return Ok(0);
        }
        let gap = target - start + 1;
        let resolution = resolution_for_gap(
            gap,
            self.config.sequential_gap_limit,
            self.config.batch_gap_limit,
        );
        info!(start, target, gap, ?resolution, "resolving gap");

        match resolution {
            GapResolution::Sequential => self.pull_sequential(start, target).await,
            // Oversized gaps also run the batched path; fast-sync is
            // chosen upstream when a snapshot can shortcut the range.
            GapResolution::ParallelBatch | GapResolution::FullRange => {
                self.pull_batched(start, target).await
            }
        }
    }

    async fn pull_sequential(&self, start: u64, end: u64) -> Result<u64, SyncError> {
        let mut applied = 0u64;
        for height in start..=end {
            if self.take_cancel() {
                return Err(SyncError::Cancelled {
                    resume_from: height,
                });
            }
            let block = self.client.fetch_block(height).await?;
            self.apply_next(block).await?;
            applied += 1;
        }
        Ok(applied)
    }

    async fn pull_batched(&self, start: u64, end: u64) -> Result<u64, SyncError> {
        let batch_size = self.config.batch_size.max(1);
        let mut ranges: Vec<(u64, u64)> = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            let batch_end = (cursor + batch_size - 1).min(end);
            ranges.push((cursor, batch_end));
            cursor = batch_end + 1;
        }

        let mut applied = 0u64;
        for window in ranges.chunks(self.config.batch_parallelism.max(1)) {
            if self.take_cancel() {
                let resume_from = self.local_height().map_or(start, |h| h + 1);
                self.pending.lock().clear();
                return Err(SyncError::Cancelled { resume_from });
            }

            let mut downloads = JoinSet::new();
            for (batch_start, batch_end) in window.iter().copied() {
                let client = self.client.clone();
                downloads.spawn(async move {
                    client
                        .fetch_range(batch_start, batch_end)
                        .await
                        .map(|blocks| (batch_start, blocks))
                });
            }

            while let Some(joined) = downloads.join_next().await {
                let (batch_start, blocks) = joined
                    .map_err(|e| SyncError::BlockRejected {
                        height: 0,
                        reason: format!("batch task failed: {e}"),
                    })??;
                debug!(batch_start, count = blocks.len(), "batch landed");
                let mut pending = self.pending.lock();
                for block in blocks {
                    pending.insert(block.height, block);
                }
            }

            // Batches may land out of order; apply what is contiguous.
            applied += self.drain_pending().await?;
        }

        applied += self.drain_pending().await?;
        Ok(applied)
    }

    /// Apply pending blocks while the next height is buffered.
    async fn drain_pending(&self) -> Result<u64, SyncError> {
        let mut applied = 0u64;
        loop {
            let next_height = self.local_height().map_or(0, |h| h + 1);
            let block = { self.pending.lock().remove(&next_height) };
            match block {
                Some(block) => {
                    self.apply_next(block).await?;
                    applied += 1;
                }
                None => break,
            }
        }
        Ok(applied)
    }

    async fn apply_next(&self, block: Block) -> Result<(), SyncError> {
        let height = block.height;
        self.validator
            .validate_and_apply(&block)
            .await
            .map_err(|e| SyncError::BlockRejected {
                height,
                reason: e.to_string(),
            })
    }

    /// One catch-up pass against the network's best height.
    pub async fn catch_up(&self) -> Result<SyncReport, SyncError> {
        let Some(remote_max) = self.client.remote_max_height().await else {
            return Ok(SyncReport {
                strategy: SyncStrategy::Full,
                applied: 0,
                tip_height: self.local_height(),
            });
        };

        let local = self.local_height();
        let snapshot_available = remote_max >= self.config.snapshot_interval;
        let strategy = choose_strategy(StrategyInputs {
            local_height: local,
            remote_max_height: remote_max,
            has_trusted_checkpoint: !self.checkpoints.is_empty(),
            snapshot_available,
            resource_constrained: self.config.resource_constrained,
        });

        let applied = match strategy {
            SyncStrategy::Full => {
                self.resolve_gap(local, remote_max).await?
            }
            SyncStrategy::Fast => self.fast_sync(remote_max).await?,
            SyncStrategy::Checkpoint => self.checkpoint_sync(remote_max).await?,
            SyncStrategy::Light => self.light_sync(remote_max).await?,
        };

        self.ledger.append_sync_log(
            "catch_up",
            "catch-up pass complete",
            serde_json::json!({ "strategy": strategy, "applied": applied }),
            shared_types::clock::now_unix(),
        )?;
        Ok(SyncReport {
            strategy,
            applied,
            tip_height: self.local_height(),
        })
    }

    /// Download the newest snapshot, verify its state root, seed the
    /// ledger from it, then pull blocks from the snapshot to the tip.
    async fn fast_sync(&self, remote_max: u64) -> Result<u64, SyncError> {
        let snapshot_height = remote_max - (remote_max % self.config.snapshot_interval);
        let snapshot = self.client.fetch_snapshot(snapshot_height).await?;
        info!(height = snapshot.height, "snapshot verified; seeding state");

        for account in &snapshot.accounts {
            self.ledger.upsert_wallet(account)?;
        }
        for validator in &snapshot.validators {
            self.ledger.upsert_validator(validator)?;
        }
        for contract in &snapshot.contracts {
            self.ledger.upsert_contract(contract)?;
        }

        // The first post-snapshot block starts the local chain mid-way.
        self.resolve_gap(Some(snapshot.height), remote_max).await
    }

    /// Apply the newest trusted checkpoint, then full-sync from there.
    async fn checkpoint_sync(&self, remote_max: u64) -> Result<u64, SyncError> {
        let Some(checkpoint) = self.checkpoints.iter().max_by_key(|c| c.height) else {
            return self.resolve_gap(self.local_height(), remote_max).await;
        };

        let block = self.client.fetch_block(checkpoint.height).await?;
        if block.hash != checkpoint.block_hash {
            warn!(height = checkpoint.height, "peer block contradicts trusted checkpoint");
            return Err(SyncError::BlockRejected {
                height: checkpoint.height,
                reason: "checkpoint hash mismatch".to_string(),
            });
        }
        self.chain.append(&block)?;
        let wallets: Vec<WalletAccount> = Vec::new();
        self.ledger
            .commit_block(&block, &wallets)
            .map_err(SyncError::Ledger)?;
        info!(height = checkpoint.height, "checkpoint applied");

        let applied = self.resolve_gap(Some(checkpoint.height), remote_max).await?;
        Ok(applied + 1)
    }

    /// Header-only sync: verify the header chain, keeping no block
    /// bodies. Returns headers verified.
    async fn light_sync(&self, remote_max: u64) -> Result<u64, SyncError> {
        let local = self.local_height().unwrap_or(0);
        if remote_max <= local {
            return Ok(0);
        }
        let headers = self.client.fetch_headers(local + 1, remote_max).await?;
        let anchor = self.chain.last()?.map(|b| b.header());
        crate::headers::verify_header_chain(anchor.as_ref(), &headers)?;
        info!(verified = headers.len(), "header chain verified");
        Ok(headers.len() as u64)
    }
}
