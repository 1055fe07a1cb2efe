//! Test harness: full nodes on ephemeral ports.

use std::net::SocketAddr;
use std::sync::Arc;

use node_runtime::config::{NodeConfig, PeerSeed};
use node_runtime::Node;
use shared_crypto::NodeKeyPair;
use shared_types::{Block, Validator, ValidatorStatus};

/// A wired node serving its HTTP surface on an ephemeral port.
pub struct TestNode {
    pub node: Arc<Node>,
    pub addr: SocketAddr,
    pub url: String,
    _dir: tempfile::TempDir,
}

/// Build and serve a node. `peers` are registered at startup.
pub async fn start_node(
    node_id: &str,
    validator_key_hex: Option<String>,
    peers: Vec<PeerSeed>,
) -> TestNode {
    start_node_full(node_id, validator_key_hex, peers, None).await
}

/// `start_node` with a broadcast secret.
pub async fn start_node_full(
    node_id: &str,
    validator_key_hex: Option<String>,
    peers: Vec<PeerSeed>,
    broadcast_secret: Option<String>,
) -> TestNode {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = NodeConfig::default();
    config.node_id = node_id.to_string();
    config.data_dir = dir.path().to_path_buf();
    config.validator_key_hex = validator_key_hex;
    config.peers = peers;
    config.broadcast_secret = broadcast_secret;

    let node = Arc::new(Node::build(config).expect("node builds"));

    let app = mc_08_gateway::build_router(node.app_state());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestNode {
        node,
        addr,
        url: format!("http://{addr}"),
        _dir: dir,
    }
}

/// A validator keypair plus its hex secret for node configuration.
pub fn validator_keypair() -> (Arc<NodeKeyPair>, String) {
    let keypair = NodeKeyPair::generate();
    let hex_secret = hex::encode(keypair.secret_bytes());
    (Arc::new(keypair), hex_secret)
}

/// Create a signed genesis and register the validator on `node`.
pub fn bootstrap_chain(node: &TestNode, keypair: &NodeKeyPair, genesis_timestamp: u64) -> Block {
    let mut genesis = Block::genesis(genesis_timestamp, keypair.address());
    genesis.signature = Some(keypair.sign_digest(&genesis.hash).expect("sign"));
    node.node.chain.append(&genesis).expect("append genesis");
    node.node
        .ledger
        .commit_block(&genesis, &[])
        .expect("project genesis");
    register_validator(node, keypair, 1_000);
    genesis
}

/// Register `keypair` as an active validator with `stake`.
pub fn register_validator(node: &TestNode, keypair: &NodeKeyPair, stake: u64) {
    node.node
        .ledger
        .upsert_validator(&Validator {
            address: keypair.address(),
            stake,
            status: ValidatorStatus::Active,
            reputation: 0,
        })
        .expect("validator upsert");
}

/// Extend `node`'s chain with `count` empty signed blocks.
pub async fn extend_chain(node: &TestNode, keypair: &NodeKeyPair, count: u64, step_secs: u64) {
    for _ in 0..count {
        let parent = node
            .node
            .chain
            .last()
            .expect("chain readable")
            .expect("chain non-empty");
        let mut block = Block::assemble(
            parent.height + 1,
            parent.hash,
            parent.timestamp + step_secs,
            keypair.address(),
            vec![],
        );
        block.signature = Some(keypair.sign_digest(&block.hash).expect("sign"));
        node.node
            .validator
            .validate_and_apply(&block)
            .await
            .expect("block applies");
    }
}

/// The seed entry other nodes use to reach this one.
pub fn seed_of(node: &TestNode) -> PeerSeed {
    PeerSeed {
        node_id: node.node.config.node_id.clone(),
        url: node.url.clone(),
    }
}
