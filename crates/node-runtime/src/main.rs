//! # Meridian Chain Node
//!
//! Entry point: load configuration, wire the subsystems, recover if the
//! stores are unhealthy, then serve the HTTP surface and run the
//! background loops until shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mc_03_ledger_db::DualStoreSync;
use node_runtime::recovery::AutoRecovery;
use node_runtime::tasks::{self, Shutdown};
use node_runtime::{Node, NodeConfig};
use shared_types::{Block, Validator, ValidatorStatus};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = NodeConfig::from_env();
    info!(node_id = %config.node_id, data_dir = %config.data_dir.display(), "starting node");

    let node = Arc::new(Node::build(config)?);

    bootstrap_genesis(&node).await?;

    // Reconcile the stores before serving; quick-health failure starts
    // the recovery ladder.
    if let Err(e) = DualStoreSync::new(&node.chain, &node.ledger).reconcile(16) {
        warn!(error = %e, "startup reconciliation failed");
    }
    if !node.lifecycle.quick_health().ok {
        warn!("quick health failed at startup; entering recovery");
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

    let shutdown = Shutdown::new();
    let handles = tasks::spawn_all(&node, &shutdown);

    let app = mc_08_gateway::build_router(node.app_state());
    let listener = tokio::net::TcpListener::bind(node.config.listen_addr)
        .await
        .with_context(|| format!("binding {}", node.config.listen_addr))?;
    info!(addr = %node.config.listen_addr, "http surface listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            info!("shutdown signal received");
            server_shutdown.trigger();
        })
        .await
        .context("http server failed")?;

    // Ingress has stopped; cancel sync work and drain the loops.
    node.sync.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    info!("node stopped");
    Ok(())
}

async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Create the genesis block on a validator's first start.
async fn bootstrap_genesis(node: &Arc<Node>) -> Result<()> {
    if node.chain.tip().is_some() {
        return Ok(());
    }
    // Non-validators wait for sync to deliver the chain.
    let Some(key_hex) = &node.config.validator_key_hex else {
        return Ok(());
    };
    let keypair = shared_crypto::NodeKeyPair::from_hex(key_hex).context("validator key")?;
    let address = keypair.address();

    let mut genesis = Block::genesis(node.time.now(), address);
    genesis.signature = Some(keypair.sign_digest(&genesis.hash)?);
    node.chain.append(&genesis)?;
    node.ledger.commit_block(&genesis, &[])?;
    node.ledger.upsert_validator(&Validator {
        address,
        stake: 1,
        status: ValidatorStatus::Active,
        reputation: 0,
    })?;
    info!(validator = %address, "genesis created");
    Ok(())
}
