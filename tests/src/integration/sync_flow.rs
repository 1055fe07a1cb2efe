//! Gap synchronization over live HTTP: an announcement ahead of the
//! local tip triggers `sync.gap_detected` and a batched download that
//! applies every missing block in order.

use shared_bus::{ChainEvent, EventFilter, EventTopic};

use crate::harness::{bootstrap_chain, extend_chain, register_validator, seed_of, start_node, validator_keypair};

#[tokio::test]
async fn announcement_ahead_triggers_batched_catch_up() {
    let (keypair, key_hex) = validator_keypair();

    // Peer with 30 blocks on top of genesis.
    let peer = start_node("chain-peer", Some(key_hex), vec![]).await;
    bootstrap_chain(&peer, &keypair, 1_700_000_000);
    extend_chain(&peer, &keypair, 30, 10).await;
    let (peer_tip, peer_tip_hash) = peer.node.chain.tip().unwrap();
    assert_eq!(peer_tip, 30);

    // Fresh node that knows the peer and trusts the same validator set.
    let fresh = start_node("fresh-node", None, vec![seed_of(&peer)]).await;
    register_validator(&fresh, &keypair, 1_000);

    let mut sync_events = fresh
        .node
        .bus
        .subscribe_stream(EventFilter::topics(vec![EventTopic::Sync]));

    let applied = fresh
        .node
        .sync
        .handle_announcement(peer_tip, None)
        .await
        .unwrap();
    assert_eq!(applied, 31, "genesis through the announced tip");
    assert_eq!(fresh.node.chain.tip().unwrap(), (peer_tip, peer_tip_hash));
    assert_eq!(fresh.node.ledger.max_height().unwrap(), Some(peer_tip));

    // The gap was observable on the bus.
    match sync_events.recv().await.unwrap() {
        ChainEvent::SyncGapDetected {
            local_height,
            received_height,
            gap_size,
        } => {
            assert_eq!(local_height, 0);
            assert_eq!(received_height, 30);
            assert_eq!(gap_size, 30);
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Every applied height agrees with the peer.
    for height in [0, 7, 19, 30] {
        assert_eq!(
            fresh.node.chain.get(height).unwrap().hash,
            peer.node.chain.get(height).unwrap().hash,
        );
    }
}

#[tokio::test]
async fn small_gap_is_pulled_sequentially() {
    let (keypair, key_hex) = validator_keypair();
    let peer = start_node("seq-peer", Some(key_hex.clone()), vec![]).await;
    bootstrap_chain(&peer, &keypair, 1_700_000_000);
    extend_chain(&peer, &keypair, 8, 10).await;

    // The follower already holds genesis (shared out-of-band).
    let follower = start_node("seq-follower", None, vec![seed_of(&peer)]).await;
    register_validator(&follower, &keypair, 1_000);
    let genesis = peer.node.chain.get(0).unwrap();
    follower.node.chain.append(&genesis).unwrap();
    follower.node.ledger.commit_block(&genesis, &[]).unwrap();

    let applied = follower.node.sync.handle_announcement(8, None).await.unwrap();
    assert_eq!(applied, 8);
    assert_eq!(follower.node.chain.tip().unwrap().0, 8);
}

#[tokio::test]
async fn catch_up_uses_peer_status() {
    let (keypair, key_hex) = validator_keypair();
    let peer = start_node("status-peer", Some(key_hex), vec![]).await;
    bootstrap_chain(&peer, &keypair, 1_700_000_000);
    extend_chain(&peer, &keypair, 5, 10).await;

    let fresh = start_node("status-follower", None, vec![seed_of(&peer)]).await;
    register_validator(&fresh, &keypair, 1_000);

    let report = fresh.node.sync.catch_up().await.unwrap();
    assert_eq!(report.applied, 6);
    assert_eq!(report.tip_height, Some(5));
}
