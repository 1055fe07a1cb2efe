//! # Background Tasks
//!
//! The node's periodic loops. Each runs on its own tokio task and exits
//! when the shutdown token flips.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shared_bus::ChainEvent;

use crate::logs;
use crate::recovery::AutoRecovery;
use crate::wiring::Node;

/// Cooperative shutdown flag shared by every loop.
#[derive(Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Spawn every background loop. The returned handles finish shortly
/// after `shutdown.trigger()`.
pub fn spawn_all(node: &Arc<Node>, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
    let mut handles = vec![
        spawn_heartbeat(node.clone(), shutdown.clone()),
        spawn_mempool_maintenance(node.clone(), shutdown.clone()),
        spawn_health_prober(node.clone(), shutdown.clone()),
        spawn_sync_worker(node.clone(), shutdown.clone()),
        spawn_dedup_purge(node.clone(), shutdown.clone()),
    ];
    if node.producer.is_some() {
        handles.push(spawn_production(node.clone(), shutdown.clone()));
    }
    handles
}

async fn tick(interval: std::time::Duration, shutdown: &Shutdown) -> bool {
    tokio::time::sleep(interval).await;
    !shutdown.is_triggered()
}

fn spawn_heartbeat(node: Arc<Node>, shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = node.config.heartbeat_interval;
        while tick(interval, &shutdown).await {
            let event = ChainEvent::Heartbeat {
                block_height: node.chain.tip().map(|(h, _)| h).unwrap_or(0),
                mempool_size: node.mempool.len(),
                timestamp: node.time.now(),
                node_id: node.config.node_id.clone(),
            };
            let report = node.propagator.broadcast(&event, node.time.now()).await;
            if report.failed > 0 {
                logs::append_line(
                    &node.config.event_sync_log_path(),
                    &format!(
                        "heartbeat delivery failed for {}/{} peers",
                        report.failed, report.targets
                    ),
                );
            }
        }
        debug!("heartbeat loop stopped");
    })
}

fn spawn_mempool_maintenance(node: Arc<Node>, shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = node.config.mempool_cleanup_interval;
        while tick(interval, &shutdown).await {
            node.mempool.cleanup().await;

            let doubles = node.mempool.detect_double_spends();
            if !doubles.is_empty() {
                warn!(count = doubles.len(), "double-spend candidates in mempool");
                let details: Vec<_> = doubles
                    .iter()
                    .map(|(address, nonce, hashes)| {
                        serde_json::json!({
                            "address": address.to_string(),
                            "nonce": nonce,
                            "count": hashes.len(),
                        })
                    })
                    .collect();
                let _ = node.ledger.append_monitoring(
                    "double_spend_detected",
                    "duplicate (sender, nonce) entries in mempool",
                    serde_json::json!(details),
                    node.time.now(),
                );
            }

            let gaps = node.mempool.validate_nonce_gaps();
            if !gaps.is_empty() {
                debug!(count = gaps.len(), "nonce gaps in mempool");
            }
        }
        debug!("mempool maintenance stopped");
    })
}

fn spawn_health_prober(node: Arc<Node>, shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let interval = node.config.peer_net.probe_interval;
        let timeout = node.config.peer_net.probe_timeout;
        while tick(interval, &shutdown).await {
            mc_01_peer_health::health::probe_all(&node.monitor, &client, timeout, node.time.now())
                .await;

            // Fold fresh scores into the persisted node table.
            for snapshot in node.monitor.snapshot_all() {
                if let Ok(Some(mut record)) = node.ledger.get_node(&snapshot.node_id) {
                    record.health_score = snapshot.health_score;
                    record.status = snapshot.status;
                    let _ = node.ledger.upsert_node(&record);
                }
            }
        }
        debug!("health prober stopped");
    })
}

fn spawn_sync_worker(node: Arc<Node>, shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = node.config.sync_interval;
        while tick(interval, &shutdown).await {
            match node.sync.catch_up().await {
                Ok(report) if report.applied > 0 => {
                    info!(applied = report.applied, tip = ?report.tip_height, "sync pass applied blocks");
                }
                Ok(_) => {}
                Err(mc_07_sync::SyncError::Store(e)) if e.is_corruption() => {
                    warn!(error = %e, "chain store corruption; entering recovery");
                    enter_recovery(&node).await;
                }
                Err(e) => warn!(error = %e, "sync pass failed"),
            }
        }
        debug!("sync worker stopped");
    })
}

/// Corruption is fatal for the serving state: abort the current work,
/// announce `Recovering`, and run the recovery ladder.
async fn enter_recovery(node: &Arc<Node>) {
    let recovery = AutoRecovery::new(
        node.config.clone(),
        node.chain.clone(),
        node.ledger.clone(),
        node.sync.clone(),
        node.lifecycle.clone(),
        node.bus.clone(),
    );
    let outcome = recovery.run().await;
    info!(?outcome, "recovery finished");
}

fn spawn_dedup_purge(node: Arc<Node>, shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(60);
        while tick(interval, &shutdown).await {
            let purged = node.dedup.purge_expired(node.time.now());
            if purged > 0 {
                debug!(purged, "dedup entries expired");
            }
        }
    })
}

fn spawn_production(node: Arc<Node>, shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(node.config.production.slot_interval_secs);
        let Some(producer) = node.producer.clone() else {
            return;
        };
        while tick(interval, &shutdown).await {
            if node.lifecycle.is_recovering() {
                debug!("recovering; production suppressed");
                continue;
            }
            match producer.produce().await {
                Ok(block) => {
                    // Relay to peers; local subscribers already saw the
                    // bus event.
                    let event = ChainEvent::BlockAdded {
                        block_hash: block.hash,
                        block_height: block.height,
                        block: Some(block),
                    };
                    let report = node.propagator.broadcast(&event, node.time.now()).await;
                    if report.failed > 0 {
                        logs::append_line(
                            &node.config.event_sync_log_path(),
                            &format!(
                                "block announcement failed for {}/{} peers",
                                report.failed, report.targets
                            ),
                        );
                    }
                }
                Err(mc_06_production::ProductionError::NotOurSlot { .. }) => {}
                Err(mc_06_production::ProductionError::NoTip) => {}
                Err(mc_06_production::ProductionError::LedgerDesync(e)) => {
                    warn!(error = %e, "ledger desync; re-importing projection");
                    let dual = mc_03_ledger_db::DualStoreSync::new(&node.chain, &node.ledger);
                    if let Err(e) = dual.reset_from_binary() {
                        warn!(error = %e, "projection re-import failed");
                    }
                }
                Err(mc_06_production::ProductionError::Store(e)) if e.is_corruption() => {
                    warn!(error = %e, "chain store corruption during production");
                    enter_recovery(&node).await;
                }
                Err(e) => warn!(error = %e, "production attempt failed"),
            }
        }
        debug!("production loop stopped");
    })
}
