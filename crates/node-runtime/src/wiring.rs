//! # Subsystem Wiring
//!
//! Constructs every subsystem and connects them over the event bus.
//! The producer publishes and the sync engine subscribes; neither knows
//! the other's concrete type.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use mc_01_peer_health::{
    CircuitBreaker, FailoverExecutor, HealthMonitor, LoadBalancer,
};
use mc_02_chain_store::{ChainStore, StoreConfig};
use mc_03_ledger_db::{LedgerDb, MempoolRow};
use mc_04_mempool::{Mempool, NonceProvider};
use mc_05_propagation::{IngressPipeline, PropagationConfig, Propagator};
use mc_06_production::{
    BlockProducer, BlockValidator, StakeWeightedSelector,
};
use mc_07_sync::{ForkResolver, SyncClient, SyncEngine};
use mc_08_gateway::AppState;
use shared_bus::{ChainEvent, DedupCache, EventBus, EventFilter, EventHandler, EventTopic, HandlerError};
use shared_crypto::{NodeKeyPair, RecoveringVerifier};
use shared_types::{clock::SystemTimeSource, Address, NodeRecord, TimeSource};

use crate::config::NodeConfig;
use crate::lifecycle::Lifecycle;

/// The fully wired node.
pub struct Node {
    pub config: NodeConfig,
    pub bus: Arc<EventBus>,
    pub chain: Arc<ChainStore>,
    pub ledger: Arc<LedgerDb>,
    pub mempool: Arc<Mempool>,
    pub monitor: Arc<HealthMonitor>,
    pub breaker: Arc<CircuitBreaker>,
    pub propagator: Arc<Propagator>,
    pub ingress: Arc<IngressPipeline>,
    pub dedup: Arc<DedupCache>,
    pub producer: Option<Arc<BlockProducer>>,
    pub validator: Arc<BlockValidator>,
    pub sync: Arc<SyncEngine>,
    pub fork: Arc<ForkResolver>,
    pub lifecycle: Arc<Lifecycle>,
    pub client: Arc<SyncClient>,
    pub time: Arc<dyn TimeSource>,
}

struct LedgerNonces(Arc<LedgerDb>);

impl NonceProvider for LedgerNonces {
    fn confirmed_nonce(&self, address: &Address) -> u64 {
        self.0.confirmed_nonce(address).unwrap_or(0)
    }
}

impl Node {
    /// Build every subsystem from configuration.
    pub fn build(config: NodeConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

        let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
        let bus = Arc::new(EventBus::new());

        let chain = Arc::new(
            ChainStore::open(StoreConfig::new(config.chain_data_dir()))
                .context("opening chain store")?,
        );
        let ledger =
            Arc::new(LedgerDb::open(&config.ledger_path()).context("opening ledger database")?);

        // Persist the broadcast secret alongside the rest of the
        // network config.
        if let Some(secret) = &config.broadcast_secret {
            ledger.set_config("network.broadcast_secret", secret)?;
        }

        let monitor = Arc::new(HealthMonitor::new(&config.peer_net));
        for seed in &config.peers {
            monitor.register(&seed.node_id, &seed.url);
            ledger.upsert_node(&NodeRecord::new(
                seed.node_id.clone(),
                seed.url.clone(),
                time.now(),
            ))?;
        }
        let balancer = Arc::new(LoadBalancer::new(monitor.clone(), config.peer_net.strategy));
        let breaker = Arc::new(CircuitBreaker::new(
            config.peer_net.breaker_failure_threshold,
            config.peer_net.breaker_cooldown,
        ));
        let failover = Arc::new(FailoverExecutor::new(
            balancer.clone(),
            breaker.clone(),
            config.peer_net.clone(),
        ));

        let verifier = Arc::new(RecoveringVerifier);
        let mempool = Arc::new(Mempool::new(
            config.mempool.clone(),
            bus.clone(),
            verifier.clone(),
            Arc::new(LedgerNonces(ledger.clone())),
            time.clone(),
        ));

        let propagation_config = PropagationConfig {
            node_id: config.node_id.clone(),
            broadcast_secret: config
                .broadcast_secret
                .as_ref()
                .map(|s| s.as_bytes().to_vec()),
            ..Default::default()
        };
        let dedup = Arc::new(DedupCache::new());
        let propagator = Arc::new(Propagator::new(
            propagation_config.clone(),
            balancer.clone(),
            breaker.clone(),
        ));
        let ingress = Arc::new(IngressPipeline::new(
            propagation_config,
            bus.clone(),
            dedup.clone(),
            time.clone(),
        ));

        let selector = Arc::new(StakeWeightedSelector);
        let validator = Arc::new(BlockValidator::new(
            config.production.clone(),
            chain.clone(),
            ledger.clone(),
            mempool.clone(),
            bus.clone(),
            verifier.clone(),
            selector.clone(),
            time.clone(),
        ));

        let keypair = match &config.validator_key_hex {
            Some(hex_key) => Some(Arc::new(
                NodeKeyPair::from_hex(hex_key).context("parsing validator key")?,
            )),
            None => None,
        };
        let producer = keypair.as_ref().map(|keypair| {
            Arc::new(BlockProducer::new(
                config.production.clone(),
                chain.clone(),
                ledger.clone(),
                mempool.clone(),
                bus.clone(),
                keypair.clone(),
                verifier.clone(),
                selector.clone(),
                time.clone(),
            ))
        });

        let client = Arc::new(SyncClient::new(
            failover.clone(),
            config.sync.clone(),
            config.node_id.clone(),
        ));
        let sync = Arc::new(SyncEngine::new(
            config.sync.clone(),
            chain.clone(),
            ledger.clone(),
            validator.clone(),
            client.clone(),
            bus.clone(),
            config.checkpoints.clone(),
        ));
        let fork = Arc::new(ForkResolver::new(
            config.sync.clone(),
            chain.clone(),
            ledger.clone(),
            validator.clone(),
            client.clone(),
        ));

        let lifecycle = Arc::new(Lifecycle::new(
            chain.clone(),
            ledger.clone(),
            monitor.clone(),
            config.data_dir.clone(),
            config.min_free_disk_bytes,
        ));

        let node = Self {
            config,
            bus,
            chain,
            ledger,
            mempool,
            monitor,
            breaker,
            propagator,
            ingress,
            dedup,
            producer,
            validator,
            sync,
            fork,
            lifecycle,
            client,
            time,
        };
        node.register_handlers();
        info!(node_id = %node.config.node_id, "node wired");
        Ok(node)
    }

    /// Register the bus subscriptions that route network events into
    /// the sync engine and the peer tables.
    fn register_handlers(&self) {
        self.bus.subscribe(
            EventFilter::topics(vec![EventTopic::Chain, EventTopic::Sync]),
            Arc::new(SyncRouting {
                sync: self.sync.clone(),
                fork: self.fork.clone(),
                ledger: self.ledger.clone(),
                time: self.time.clone(),
            }),
        );
        self.bus.subscribe(
            EventFilter::topics(vec![EventTopic::Network]),
            Arc::new(PeerRouting {
                monitor: self.monitor.clone(),
                ledger: self.ledger.clone(),
                time: self.time.clone(),
            }),
        );
        self.bus.subscribe(
            EventFilter::topics(vec![EventTopic::Mempool]),
            Arc::new(MempoolRouting {
                mempool: self.mempool.clone(),
                ledger: self.ledger.clone(),
            }),
        );
    }

    /// Gateway state for the HTTP surface.
    pub fn app_state(&self) -> AppState {
        AppState {
            node_id: self.config.node_id.clone(),
            ingress: self.ingress.clone(),
            chain: self.chain.clone(),
            ledger: self.ledger.clone(),
            mempool: self.mempool.clone(),
            monitor: self.monitor.clone(),
            status: self.lifecycle.clone(),
            max_range_blocks: 500,
        }
    }
}

/// Routes block/gap/fork events into the sync engine. Heavy work is
/// spawned so bus dispatch never stalls.
struct SyncRouting {
    sync: Arc<SyncEngine>,
    fork: Arc<ForkResolver>,
    ledger: Arc<LedgerDb>,
    time: Arc<dyn TimeSource>,
}

#[async_trait]
impl EventHandler for SyncRouting {
    fn name(&self) -> &str {
        "sync-routing"
    }

    async fn handle(&self, event: &ChainEvent) -> Result<(), HandlerError> {
        match event {
            ChainEvent::BlockAdded {
                block_height,
                block,
                ..
            } => {
                let sync = self.sync.clone();
                let ledger = self.ledger.clone();
                let now = self.time.now();
                let block_height = *block_height;
                let block = block.clone();
                tokio::spawn(async move {
                    if let Err(e) = sync.handle_announcement(block_height, block).await {
                        warn!(block_height, error = %e, "announcement handling failed");
                        // A rejected block is dropped and recorded; it is
                        // never retried.
                        let _ = ledger.append_monitoring(
                            "alert_raised",
                            "announced block rejected",
                            serde_json::json!({
                                "block_height": block_height,
                                "reason": e.to_string(),
                            }),
                            now,
                        );
                    }
                });
                Ok(())
            }
            ChainEvent::ForkDetected {
                fork_height,
                remote_hash,
                ..
            } => {
                let fork = self.fork.clone();
                let fork_height = *fork_height;
                let remote_hash = *remote_hash;
                tokio::spawn(async move {
                    match fork.resolve(fork_height, remote_hash).await {
                        Ok(outcome) => info!(?outcome, "fork check finished"),
                        Err(e) => warn!(fork_height, error = %e, "fork resolution failed"),
                    }
                });
                Ok(())
            }
            ChainEvent::SyncGapDetected { gap_size, .. } => {
                // Resolution already runs in the announcement path; the
                // event is the observable record.
                info!(gap_size, "gap detected");
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Folds heartbeats and status updates into the peer tables.
struct PeerRouting {
    monitor: Arc<HealthMonitor>,
    ledger: Arc<LedgerDb>,
    time: Arc<dyn TimeSource>,
}

#[async_trait]
impl EventHandler for PeerRouting {
    fn name(&self) -> &str {
        "peer-routing"
    }

    async fn handle(&self, event: &ChainEvent) -> Result<(), HandlerError> {
        match event {
            ChainEvent::Heartbeat { node_id, .. } => {
                let now = self.time.now();
                self.monitor.touch(node_id, now);
                if let Ok(Some(mut record)) = self.ledger.get_node(node_id) {
                    record.last_seen = now;
                    self.ledger
                        .upsert_node(&record)
                        .map_err(|e| HandlerError::new(e.to_string()))?;
                }
                Ok(())
            }
            ChainEvent::NodeStatusChanged { node_id, status } => {
                if let Ok(Some(mut record)) = self.ledger.get_node(node_id) {
                    record.status = *status;
                    self.ledger
                        .upsert_node(&record)
                        .map_err(|e| HandlerError::new(e.to_string()))?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Mirrors mempool admissions into the persisted mempool table.
struct MempoolRouting {
    mempool: Arc<Mempool>,
    ledger: Arc<LedgerDb>,
}

#[async_trait]
impl EventHandler for MempoolRouting {
    fn name(&self) -> &str {
        "mempool-routing"
    }

    async fn handle(&self, event: &ChainEvent) -> Result<(), HandlerError> {
        match event {
            ChainEvent::MempoolTransactionAdded {
                transaction_hash, ..
            } => {
                // Persist the entry if it is still pooled.
                if let Some(entry) = self
                    .mempool
                    .snapshot()
                    .into_iter()
                    .find(|e| e.transaction.hash == *transaction_hash)
                {
                    let row = MempoolRow {
                        transaction: entry.transaction,
                        priority_score: entry.priority_score,
                        arrival_time: entry.arrival_time,
                        expires_at: entry.expires_at,
                        retry_count: entry.retry_count,
                    };
                    self.ledger
                        .put_mempool_row(&row)
                        .map_err(|e| HandlerError::new(e.to_string()))?;
                }
                Ok(())
            }
            ChainEvent::MempoolTransactionRemoved {
                transaction_hash, ..
            } => {
                self.ledger
                    .delete_mempool_row(transaction_hash)
                    .map_err(|e| HandlerError::new(e.to_string()))?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
