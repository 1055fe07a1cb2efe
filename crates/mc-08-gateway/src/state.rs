//! Shared handler state.

use std::sync::Arc;

use serde::Serialize;

use mc_01_peer_health::HealthMonitor;
use mc_02_chain_store::ChainStore;
use mc_03_ledger_db::LedgerDb;
use mc_04_mempool::Mempool;
use mc_05_propagation::IngressPipeline;
use shared_types::NodeStatus;

/// Quick health summary served by `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct QuickStatus {
    pub ok: bool,
    pub status: NodeStatus,
    pub tip_height: Option<u64>,
}

/// Lifecycle status provider, implemented by the node runtime.
pub trait StatusSource: Send + Sync {
    /// Must complete well under 100 ms.
    fn quick(&self) -> QuickStatus;

    /// Full status document including component checks.
    fn full(&self) -> serde_json::Value;
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub node_id: String,
    pub ingress: Arc<IngressPipeline>,
    pub chain: Arc<ChainStore>,
    pub ledger: Arc<LedgerDb>,
    pub mempool: Arc<Mempool>,
    pub monitor: Arc<HealthMonitor>,
    pub status: Arc<dyn StatusSource>,
    /// Hard cap on blocks served per range request.
    pub max_range_blocks: u64,
}
