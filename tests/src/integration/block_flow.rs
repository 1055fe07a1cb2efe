//! Happy-path block lifecycle: a transfer moves through the mempool
//! into a produced block, and both stores plus the wallet table agree.

use shared_bus::{ChainEvent, EventFilter, EventTopic};
use shared_types::{Address, Transaction, WalletAccount};

use crate::harness::{bootstrap_chain, start_node, validator_keypair};

#[tokio::test]
async fn transfer_confirms_and_updates_wallets() {
    let (keypair, key_hex) = validator_keypair();
    let node = start_node("producer-node", Some(key_hex), vec![]).await;
    bootstrap_chain(&node, &keypair, 1_700_000_000);

    // Alice is the validator account, funded out-of-band.
    let alice = keypair.address();
    let bob = Address([0xB0; 20]);
    node.node
        .ledger
        .upsert_wallet(&WalletAccount {
            address: alice,
            public_key: None,
            balance: 1_000,
            nonce: 0,
        })
        .unwrap();

    let mut tx = Transaction::new(
        alice,
        bob,
        50,
        1,
        1,
        21_000,
        1,
        vec![],
        shared_types::clock::now_unix(),
    );
    tx.signature = Some(keypair.sign_digest(&tx.hash).unwrap());
    node.node.mempool.add(tx.clone()).await.unwrap();

    let mut chain_events = node
        .node
        .bus
        .subscribe_stream(EventFilter::topics(vec![EventTopic::Chain]));

    let producer = node.node.producer.as_ref().expect("validator node");
    let block = producer.produce().await.unwrap();

    // One block.added announcement for the new tip.
    match chain_events.recv().await.unwrap() {
        ChainEvent::BlockAdded {
            block_height,
            block_hash,
            ..
        } => {
            assert_eq!(block_height, 1);
            assert_eq!(block_hash, block.hash);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(chain_events.try_recv().is_none(), "exactly one announcement");

    // Both stores advanced together.
    assert_eq!(node.node.chain.tip().unwrap(), (1, block.hash));
    assert_eq!(node.node.ledger.max_height().unwrap(), Some(1));

    // Wallet arithmetic: 1000 − 50 − 1 fee; nonces advanced.
    let alice_account = node.node.ledger.get_wallet(&alice).unwrap().unwrap();
    assert_eq!(alice_account.balance, 949);
    assert_eq!(alice_account.nonce, 1);
    let bob_account = node.node.ledger.get_wallet(&bob).unwrap().unwrap();
    assert_eq!(bob_account.balance, 50);
    assert_eq!(bob_account.nonce, 0);

    // The included transaction left the mempool and is confirmed.
    assert!(node.node.mempool.is_empty());
    let row = node
        .node
        .ledger
        .get_transaction(&shared_types::normalize::format_hash(&tx.hash))
        .unwrap()
        .unwrap();
    assert_eq!(row.block_height, Some(1));

    // Fee sum invariant.
    assert_eq!(block.total_fees(), 1);
}

#[tokio::test]
async fn duplicate_apply_is_a_noop() {
    let (keypair, key_hex) = validator_keypair();
    let node = start_node("dup-node", Some(key_hex), vec![]).await;
    bootstrap_chain(&node, &keypair, 1_700_000_000);

    let producer = node.node.producer.as_ref().unwrap();
    let block = producer.produce().await.unwrap();
    let stats_before = node.node.chain.stats();

    // The same block arriving again changes nothing.
    let outcome = node.node.chain.append(&block).unwrap();
    assert_eq!(outcome, mc_02_chain_store::AppendOutcome::Duplicate);
    node.node.ledger.commit_block(&block, &[]).unwrap();
    assert_eq!(node.node.chain.stats(), stats_before);
    assert_eq!(node.node.ledger.block_count().unwrap(), 2);
}
