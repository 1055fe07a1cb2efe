//! # Node Lifecycle
//!
//! Quick health answers probes in well under 100 ms using only cheap
//! checks; full health adds structural validation, cross-store
//! sampling, and resource headroom. While recovering, the node refuses
//! block production and reports `Recovering`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;

use mc_01_peer_health::HealthMonitor;
use mc_02_chain_store::ChainStore;
use mc_03_ledger_db::{DualStoreSync, LedgerDb};
use mc_08_gateway::{QuickStatus, StatusSource};
use shared_types::NodeStatus;

/// Minimum chain file size for quick health: header plus any content.
const MIN_CHAIN_FILE_BYTES: u64 = 8;

/// Lifecycle state and health checks.
pub struct Lifecycle {
    chain: Arc<ChainStore>,
    ledger: Arc<LedgerDb>,
    monitor: Arc<HealthMonitor>,
    data_dir: PathBuf,
    min_free_disk_bytes: u64,
    recovering: AtomicBool,
}

impl Lifecycle {
    pub fn new(
        chain: Arc<ChainStore>,
        ledger: Arc<LedgerDb>,
        monitor: Arc<HealthMonitor>,
        data_dir: PathBuf,
        min_free_disk_bytes: u64,
    ) -> Self {
        Self {
            chain,
            ledger,
            monitor,
            data_dir,
            min_free_disk_bytes,
            recovering: AtomicBool::new(false),
        }
    }

    pub fn is_recovering(&self) -> bool {
        self.recovering.load(Ordering::SeqCst)
    }

    pub fn set_recovering(&self, on: bool) {
        self.recovering.store(on, Ordering::SeqCst);
    }

    /// Quick health: chain file present and non-trivial, ledger
    /// reachable, not recovering.
    pub fn quick_health(&self) -> QuickStatus {
        if self.is_recovering() {
            return QuickStatus {
                ok: false,
                status: NodeStatus::Recovering,
                tip_height: self.chain.tip().map(|(h, _)| h),
            };
        }

        let file_ok = std::fs::metadata(self.chain.config().chain_path())
            .map(|m| m.len() > MIN_CHAIN_FILE_BYTES)
            .unwrap_or(false);
        let ledger_ok = self.ledger.get_config("system.schema_version").is_ok();
        let ok = file_ok && ledger_ok;

        QuickStatus {
            ok,
            status: if ok {
                NodeStatus::Healthy
            } else {
                NodeStatus::Unhealthy
            },
            tip_height: self.chain.tip().map(|(h, _)| h),
        }
    }

    /// Full health: quick checks plus file structure, cross-store
    /// sample, disk headroom, memory headroom, and peer reachability.
    pub fn full_health(&self) -> serde_json::Value {
        let quick = self.quick_health();

        let file_report = self.chain.validate_file();
        let file_clean = file_report.as_ref().map(|r| r.is_clean()).unwrap_or(false);

        let cross = DualStoreSync::new(&self.chain, &self.ledger).validate_cross_store(8);
        let cross_consistent = cross.as_ref().map(|r| r.is_consistent()).unwrap_or(false);

        let free_disk = fs2::available_space(&self.data_dir).unwrap_or(0);
        let disk_ok = free_disk >= self.min_free_disk_bytes;

        let memory_headroom = available_memory_bytes();
        let reachability = self.monitor.reachability_ratio();
        let peers_ok = reachability >= 0.5;

        let healthy = quick.ok && file_clean && cross_consistent && disk_ok && peers_ok;

        json!({
            "ok": healthy,
            "status": if self.is_recovering() {
                NodeStatus::Recovering
            } else if healthy {
                NodeStatus::Healthy
            } else {
                NodeStatus::Degraded
            },
            "components": {
                "chain_file": { "ok": file_clean },
                "cross_store": {
                    "ok": cross_consistent,
                    "mismatches": cross.map(|r| r.mismatched_heights).unwrap_or_default(),
                },
                "disk": { "ok": disk_ok, "free_bytes": free_disk },
                "memory": { "available_bytes": memory_headroom },
                "peers": { "ok": peers_ok, "reachability": reachability },
            },
        })
    }
}

impl StatusSource for Lifecycle {
    fn quick(&self) -> QuickStatus {
        self.quick_health()
    }

    fn full(&self) -> serde_json::Value {
        self.full_health()
    }
}

/// Available memory from /proc/meminfo; `None` where unsupported.
fn available_memory_bytes() -> Option<u64> {
    let content = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}
