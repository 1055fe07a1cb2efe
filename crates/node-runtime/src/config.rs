//! Node configuration.
//!
//! Defaults suit a local development node; the `MC_*` environment
//! variables override them at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use mc_01_peer_health::PeerNetConfig;
use mc_04_mempool::MempoolConfig;
use mc_06_production::ProductionConfig;
use mc_07_sync::SyncConfig;
use shared_types::Checkpoint;

/// A configured peer seed: `node_id@http://host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSeed {
    pub node_id: String,
    pub url: String,
}

/// Top-level node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Stable node identifier; defaults to a random UUID.
    pub node_id: String,
    /// Data directory for the chain file, ledger, and logs.
    pub data_dir: PathBuf,
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// Hex-encoded validator secret key; absent on non-validators.
    pub validator_key_hex: Option<String>,
    /// Pre-shared broadcast secret for event signing.
    pub broadcast_secret: Option<String>,
    /// Seed peers.
    pub peers: Vec<PeerSeed>,
    /// Trusted checkpoints (configuration, never network-sourced).
    pub checkpoints: Vec<Checkpoint>,
    /// Heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Mempool maintenance interval.
    pub mempool_cleanup_interval: Duration,
    /// Catch-up pass interval for the sync worker.
    pub sync_interval: Duration,
    /// Minimum free disk below which full health degrades.
    pub min_free_disk_bytes: u64,
    pub mempool: MempoolConfig,
    pub production: ProductionConfig,
    pub sync: SyncConfig,
    pub peer_net: PeerNetConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: format!("node-{}", uuid::Uuid::new_v4()),
            data_dir: PathBuf::from("./data"),
            listen_addr: "0.0.0.0:8545".parse().expect("static addr parses"),
            validator_key_hex: None,
            broadcast_secret: None,
            peers: Vec::new(),
            checkpoints: Vec::new(),
            heartbeat_interval: Duration::from_secs(30),
            mempool_cleanup_interval: Duration::from_secs(60),
            sync_interval: Duration::from_secs(60),
            min_free_disk_bytes: 512 * 1024 * 1024,
            mempool: MempoolConfig::default(),
            production: ProductionConfig::default(),
            sync: SyncConfig::default(),
            peer_net: PeerNetConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Defaults overridden by `MC_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(node_id) = std::env::var("MC_NODE_ID") {
            config.node_id = node_id;
        }
        if let Ok(dir) = std::env::var("MC_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("MC_LISTEN_ADDR") {
            if let Ok(parsed) = addr.parse() {
                config.listen_addr = parsed;
            }
        }
        if let Ok(key) = std::env::var("MC_VALIDATOR_KEY") {
            config.validator_key_hex = Some(key);
        }
        if let Ok(secret) = std::env::var("MC_BROADCAST_SECRET") {
            config.broadcast_secret = Some(secret);
        }
        if let Ok(peers) = std::env::var("MC_PEERS") {
            config.peers = parse_peers(&peers);
        }
        config
    }

    pub fn chain_data_dir(&self) -> PathBuf {
        self.data_dir.join("chain")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger")
    }

    pub fn recovery_log_path(&self) -> PathBuf {
        self.data_dir.join("recovery.log")
    }

    pub fn event_sync_log_path(&self) -> PathBuf {
        self.data_dir.join("event_sync.log")
    }
}

/// Parse `id@url,id@url` peer lists.
pub fn parse_peers(input: &str) -> Vec<PeerSeed> {
    input
        .split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            let (node_id, url) = entry.split_once('@')?;
            if node_id.is_empty() || url.is_empty() {
                return None;
            }
            Some(PeerSeed {
                node_id: node_id.to_string(),
                url: url.trim_end_matches('/').to_string(),
            })
        })
        .collect()
}
