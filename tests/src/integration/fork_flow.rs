//! Fork resolution over live HTTP: a disagreeing supermajority chain
//! with greater cumulative stake replaces the local tail, and the
//! rollback leaves an `alert_raised` monitoring record.

use mc_07_sync::ForkOutcome;
use shared_types::Block;

use crate::harness::{bootstrap_chain, register_validator, seed_of, start_node, validator_keypair};

/// Extend a node's chain with a deterministic sequence of empty
/// blocks, offsetting the timestamps so two chains diverge.
async fn extend_with_offset(
    node: &crate::harness::TestNode,
    keypair: &shared_crypto::NodeKeyPair,
    count: u64,
    offset: u64,
) {
    for _ in 0..count {
        let parent = node.node.chain.last().unwrap().unwrap();
        let mut block = Block::assemble(
            parent.height + 1,
            parent.hash,
            parent.timestamp + offset,
            keypair.address(),
            vec![],
        );
        block.signature = Some(keypair.sign_digest(&block.hash).unwrap());
        node.node.validator.validate_and_apply(&block).await.unwrap();
    }
}

#[tokio::test]
async fn heavier_majority_chain_replaces_local_tail() {
    let (keypair, key_hex) = validator_keypair();

    // The remote holds a longer chain that diverges right after genesis.
    let remote = start_node("fork-remote", Some(key_hex.clone()), vec![]).await;
    let genesis = bootstrap_chain(&remote, &keypair, 1_700_000_000);
    extend_with_offset(&remote, &keypair, 4, 13).await;

    // The local node shares genesis but grew a shorter tail of its own.
    let local = start_node("fork-local", Some(key_hex), vec![seed_of(&remote)]).await;
    local.node.chain.append(&genesis).unwrap();
    local.node.ledger.commit_block(&genesis, &[]).unwrap();
    register_validator(&local, &keypair, 1_000);
    extend_with_offset(&local, &keypair, 2, 7).await;

    let local_tip_before = local.node.chain.tip().unwrap();
    let remote_hash_at_1 = remote.node.chain.get(1).unwrap().hash;
    assert_ne!(local.node.chain.get(1).unwrap().hash, remote_hash_at_1);

    let outcome = local
        .node
        .fork
        .resolve(1, remote_hash_at_1)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ForkOutcome::Reorganized {
            common_ancestor: 0,
            applied: 4
        }
    );

    // Local now follows the majority chain.
    let (tip_height, tip_hash) = local.node.chain.tip().unwrap();
    assert_eq!(tip_height, 4);
    assert_eq!(tip_hash, remote.node.chain.tip().unwrap().1);
    assert_ne!((tip_height, tip_hash), local_tip_before);
    assert_eq!(local.node.ledger.max_height().unwrap(), Some(4));

    // The incident trail: an alert and the reorganization record.
    let kinds: Vec<String> = local
        .node
        .ledger
        .recent_monitoring(10)
        .unwrap()
        .into_iter()
        .map(|row| row.kind)
        .collect();
    assert!(kinds.iter().any(|k| k == "alert_raised"));
    assert!(kinds.iter().any(|k| k == "fork_reorganized"));
}

#[tokio::test]
async fn matching_hash_needs_no_action() {
    let (keypair, key_hex) = validator_keypair();
    let remote = start_node("agree-remote", Some(key_hex.clone()), vec![]).await;
    let genesis = bootstrap_chain(&remote, &keypair, 1_700_000_000);

    let local = start_node("agree-local", Some(key_hex), vec![seed_of(&remote)]).await;
    local.node.chain.append(&genesis).unwrap();
    local.node.ledger.commit_block(&genesis, &[]).unwrap();
    register_validator(&local, &keypair, 1_000);

    let outcome = local.node.fork.resolve(0, genesis.hash).await.unwrap();
    assert_eq!(outcome, ForkOutcome::LocalCanonical);
}

#[tokio::test]
async fn lighter_remote_chain_is_refused() {
    let (keypair, key_hex) = validator_keypair();

    // Remote has the SHORTER tail this time.
    let remote = start_node("light-remote", Some(key_hex.clone()), vec![]).await;
    let genesis = bootstrap_chain(&remote, &keypair, 1_700_000_000);
    extend_with_offset(&remote, &keypair, 1, 13).await;

    let local = start_node("light-local", Some(key_hex), vec![seed_of(&remote)]).await;
    local.node.chain.append(&genesis).unwrap();
    local.node.ledger.commit_block(&genesis, &[]).unwrap();
    register_validator(&local, &keypair, 1_000);
    extend_with_offset(&local, &keypair, 3, 7).await;

    let remote_hash_at_1 = remote.node.chain.get(1).unwrap().hash;
    let outcome = local.node.fork.resolve(1, remote_hash_at_1).await.unwrap();
    assert_eq!(outcome, ForkOutcome::LocalCanonical);
    assert_eq!(local.node.chain.tip().unwrap().0, 3);
}
