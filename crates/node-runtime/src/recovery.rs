//! # Auto-Recovery
//!
//! Runs when quick health fails. The ladder, in order:
//!
//! 1. restore the latest verified local backup
//! 2. catch up from the healthiest peer whose tip is at least ours
//! 3. partial recovery: salvage readable blocks, rebuild projections
//! 4. report the remaining options for the operator
//!
//! While recovering the node announces `Recovering` and refuses block
//! production.

use std::sync::Arc;

use tracing::{info, warn};

use mc_02_chain_store::{list_backups, ChainStore};
use mc_03_ledger_db::{DualStoreSync, LedgerDb};
use mc_07_sync::SyncEngine;
use shared_bus::{ChainEvent, EventBus};
use shared_types::NodeStatus;

use crate::config::NodeConfig;
use crate::lifecycle::Lifecycle;
use crate::logs;

/// How the node came back, or why it could not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Restored from a verified local backup.
    LocalBackup { tip_height: Option<u64> },
    /// Caught up from peers.
    Peers { applied: u64 },
    /// Salvaged readable blocks and rebuilt the projection.
    Partial { recovered: u64, dropped: u64 },
    /// Nothing worked; operator action required.
    Failed { options: Vec<String> },
}

/// The recovery driver.
pub struct AutoRecovery {
    config: NodeConfig,
    chain: Arc<ChainStore>,
    ledger: Arc<LedgerDb>,
    sync: Arc<SyncEngine>,
    lifecycle: Arc<Lifecycle>,
    bus: Arc<EventBus>,
}

impl AutoRecovery {
    pub fn new(
        config: NodeConfig,
        chain: Arc<ChainStore>,
        ledger: Arc<LedgerDb>,
        sync: Arc<SyncEngine>,
        lifecycle: Arc<Lifecycle>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            chain,
            ledger,
            sync,
            lifecycle,
            bus,
        }
    }

    /// Run the ladder until a rung succeeds.
    pub async fn run(&self) -> RecoveryOutcome {
        self.lifecycle.set_recovering(true);
        self.bus
            .publish(ChainEvent::NodeStatusChanged {
                node_id: self.config.node_id.clone(),
                status: NodeStatus::Recovering,
            })
            .await;
        let log_path = self.config.recovery_log_path();
        logs::append_line(&log_path, "recovery started");

        let outcome = self.ladder().await;

        match &outcome {
            RecoveryOutcome::Failed { options } => {
                logs::append_line(
                    &log_path,
                    &format!("recovery failed; options: {}", options.join("; ")),
                );
                warn!("auto-recovery exhausted all rungs");
                // Still recovering: the operator must intervene.
            }
            success => {
                logs::append_line(&log_path, &format!("recovery succeeded: {success:?}"));
                self.lifecycle.set_recovering(false);
                self.bus
                    .publish(ChainEvent::NodeStatusChanged {
                        node_id: self.config.node_id.clone(),
                        status: NodeStatus::Healthy,
                    })
                    .await;
            }
        }
        outcome
    }

    async fn ladder(&self) -> RecoveryOutcome {
        let log_path = self.config.recovery_log_path();

        // Rung 1: latest verified local backup.
        match self.try_backups() {
            Ok(Some(outcome)) => return outcome,
            Ok(None) => logs::append_line(&log_path, "rung=backup outcome=none-usable"),
            Err(e) => logs::append_line(&log_path, &format!("rung=backup outcome=error {e}")),
        }

        // Rung 2: catch up from peers.
        match self.sync.catch_up().await {
            Ok(report) if report.applied > 0 => {
                let reconciled = DualStoreSync::new(&self.chain, &self.ledger).reconcile(16);
                if let Err(e) = reconciled {
                    logs::append_line(&log_path, &format!("rung=peers reconcile-error {e}"));
                } else {
                    info!(applied = report.applied, "recovered from peers");
                    return RecoveryOutcome::Peers {
                        applied: report.applied,
                    };
                }
            }
            Ok(_) => logs::append_line(&log_path, "rung=peers outcome=no-progress"),
            Err(e) => logs::append_line(&log_path, &format!("rung=peers outcome=error {e}")),
        }

        // Rung 3: partial salvage.
        match self.try_partial() {
            Ok(outcome) => return outcome,
            Err(e) => logs::append_line(&log_path, &format!("rung=partial outcome=error {e}")),
        }

        RecoveryOutcome::Failed {
            options: vec![
                "restore a backup manually into the data directory".to_string(),
                "resync from a trusted peer with an empty data directory".to_string(),
                "bootstrap from a trusted checkpoint".to_string(),
            ],
        }
    }

    fn try_backups(&self) -> anyhow::Result<Option<RecoveryOutcome>> {
        for backup_dir in list_backups(self.chain.config())? {
            match self.chain.restore(&backup_dir) {
                Ok(manifest) => {
                    // The projection must follow the restored history.
                    DualStoreSync::new(&self.chain, &self.ledger).reset_from_binary()?;
                    info!(from = %backup_dir.display(), "restored from backup");
                    return Ok(Some(RecoveryOutcome::LocalBackup {
                        tip_height: manifest.tip_height,
                    }));
                }
                Err(e) => {
                    warn!(backup = %backup_dir.display(), error = %e, "backup unusable");
                }
            }
        }
        Ok(None)
    }

    fn try_partial(&self) -> anyhow::Result<RecoveryOutcome> {
        let report = self.chain.repair()?;
        DualStoreSync::new(&self.chain, &self.ledger).reset_from_binary()?;
        info!(recovered = report.recovered, dropped = report.dropped, "partial recovery complete");
        Ok(RecoveryOutcome::Partial {
            recovered: report.recovered,
            dropped: report.dropped,
        })
    }
}
