//! # Block Producer
//!
//! At slot time, when this node's validator is chosen: snapshot the
//! mempool, run the execution pass against a scratch state view,
//! assemble and sign the block, append it to the chain file, commit the
//! projection atomically, then announce `block.added`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use mc_02_chain_store::ChainStore;
use mc_03_ledger_db::{LedgerDb, StateView};
use mc_04_mempool::Mempool;
use shared_bus::{ChainEvent, EventBus};
use shared_types::{Block, BlockSigner, TimeSource, Transaction, TransactionVerifier};

use crate::config::ProductionConfig;
use crate::errors::ProductionError;
use crate::selector::ProducerSelector;

/// Assembles and commits blocks for this node's validator identity.
pub struct BlockProducer {
    config: ProductionConfig,
    chain: Arc<ChainStore>,
    ledger: Arc<LedgerDb>,
    mempool: Arc<Mempool>,
    bus: Arc<EventBus>,
    signer: Arc<dyn BlockSigner>,
    verifier: Arc<dyn TransactionVerifier>,
    selector: Arc<dyn ProducerSelector>,
    time: Arc<dyn TimeSource>,
}

impl BlockProducer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ProductionConfig,
        chain: Arc<ChainStore>,
        ledger: Arc<LedgerDb>,
        mempool: Arc<Mempool>,
        bus: Arc<EventBus>,
        signer: Arc<dyn BlockSigner>,
        verifier: Arc<dyn TransactionVerifier>,
        selector: Arc<dyn ProducerSelector>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            config,
            chain,
            ledger,
            mempool,
            bus,
            signer,
            verifier,
            selector,
            time,
        }
    }

    /// Whether this node holds the slot for the next height.
    pub fn holds_slot(&self) -> Result<bool, ProductionError> {
        let (tip_height, tip_hash) = self.chain.tip().ok_or(ProductionError::NoTip)?;
        let validators = self.ledger.validators()?;
        let chosen = self
            .selector
            .select_producer(tip_height + 1, &tip_hash, &validators)
            .ok_or(ProductionError::NoActiveValidators)?;
        Ok(chosen == self.signer.address())
    }

    /// Produce one block at the next height.
    ///
    /// # Errors
    ///
    /// `NotOurSlot` when another validator is assigned; store errors are
    /// passed through. A ledger failure after the binary append returns
    /// `LedgerDesync`, which the caller must resolve by re-importing the
    /// projection from the chain file.
    pub async fn produce(&self) -> Result<Block, ProductionError> {
        let (tip_height, tip_hash) = self.chain.tip().ok_or(ProductionError::NoTip)?;
        let height = tip_height + 1;

        let validators = self.ledger.validators()?;
        let chosen = self
            .selector
            .select_producer(height, &tip_hash, &validators)
            .ok_or(ProductionError::NoActiveValidators)?;
        if chosen != self.signer.address() {
            return Err(ProductionError::NotOurSlot { chosen });
        }

        // Snapshot the best candidates and execute them against a
        // scratch view, discarding violators instead of failing.
        let candidates = self
            .mempool
            .get_for_block(self.config.max_txs_per_block, self.config.max_gas_per_block);
        let (transactions, wallets) = self.execution_pass(candidates)?;

        let parent = self.chain.last()?.ok_or(ProductionError::NoTip)?;
        let timestamp = self.time.now().max(parent.timestamp + 1);
        let mut block = Block::assemble(
            height,
            tip_hash,
            timestamp,
            self.signer.address(),
            transactions,
        );
        block.signature = Some(self.signer.sign(&block.hash));

        self.chain.append(&block)?;
        self.ledger
            .commit_block(&block, &wallets)
            .map_err(ProductionError::LedgerDesync)?;

        for tx in &block.transactions {
            self.mempool.remove(&tx.hash).await;
        }

        info!(
            height,
            txs = block.tx_count,
            hash = %shared_types::normalize::format_hash(&block.hash),
            "block produced"
        );
        self.bus
            .publish(ChainEvent::BlockAdded {
                block_hash: block.hash,
                block_height: block.height,
                block: Some(block.clone()),
            })
            .await;

        Ok(block)
    }

    /// Pure execution pass: validate and apply each candidate against a
    /// scratch view, dropping any transaction that would violate
    /// balance or nonce rules.
    fn execution_pass(
        &self,
        candidates: Vec<Transaction>,
    ) -> Result<(Vec<Transaction>, Vec<shared_types::WalletAccount>), ProductionError> {
        let mut view = StateView::over(self.ledger.as_ref());
        let mut included = Vec::with_capacity(candidates.len());

        for tx in candidates {
            if let Err(e) = tx.validate(self.verifier.as_ref()) {
                warn!(hash = %shared_types::normalize::format_hash(&tx.hash), error = %e, "candidate dropped");
                continue;
            }
            match view.apply_transaction(&tx) {
                Ok(()) => included.push(tx),
                Err(e) => {
                    debug!(hash = %shared_types::normalize::format_hash(&tx.hash), error = %e, "candidate violates state");
                }
            }
        }
        Ok((included, view.into_accounts()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::StakeWeightedSelector;
    use mc_02_chain_store::StoreConfig;
    use mc_04_mempool::{MempoolConfig, NonceProvider};
    use shared_crypto::{NodeKeyPair, RecoveringVerifier};
    use shared_types::clock::ManualTimeSource;
    use shared_types::{Address, Hash, Validator, ValidatorStatus, WalletAccount};

    struct LedgerNonces(Arc<LedgerDb>);
    impl NonceProvider for LedgerNonces {
        fn confirmed_nonce(&self, address: &Address) -> u64 {
            self.0.confirmed_nonce(address).unwrap_or(0)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        chain: Arc<ChainStore>,
        ledger: Arc<LedgerDb>,
        mempool: Arc<Mempool>,
        bus: Arc<EventBus>,
        keypair: Arc<NodeKeyPair>,
        time: Arc<ManualTimeSource>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(ChainStore::open(StoreConfig::new(dir.path().join("bin"))).unwrap());
        let ledger = Arc::new(LedgerDb::open(&dir.path().join("db")).unwrap());
        let bus = Arc::new(EventBus::new());
        let time = Arc::new(ManualTimeSource::new(1_700_000_100));
        let mempool = Arc::new(Mempool::new(
            MempoolConfig::default(),
            bus.clone(),
            Arc::new(RecoveringVerifier),
            Arc::new(LedgerNonces(ledger.clone())),
            time.clone(),
        ));
        Fixture {
            _dir: dir,
            chain,
            ledger,
            mempool,
            bus,
            keypair: Arc::new(NodeKeyPair::generate()),
            time,
        }
    }

    fn producer(fx: &Fixture) -> BlockProducer {
        BlockProducer::new(
            ProductionConfig::default(),
            fx.chain.clone(),
            fx.ledger.clone(),
            fx.mempool.clone(),
            fx.bus.clone(),
            fx.keypair.clone(),
            Arc::new(RecoveringVerifier),
            Arc::new(StakeWeightedSelector),
            fx.time.clone(),
        )
    }

    fn bootstrap(fx: &Fixture) -> Block {
        let genesis = Block::genesis(1_700_000_000, fx.keypair.address());
        fx.chain.append(&genesis).unwrap();
        fx.ledger.commit_block(&genesis, &[]).unwrap();
        fx.ledger
            .upsert_validator(&Validator {
                address: fx.keypair.address(),
                stake: 1_000,
                status: ValidatorStatus::Active,
                reputation: 0,
            })
            .unwrap();
        genesis
    }

    fn signed_transfer(
        keypair: &NodeKeyPair,
        to: Address,
        amount: u64,
        nonce: u64,
    ) -> shared_types::Transaction {
        let mut tx = shared_types::Transaction::new(
            keypair.address(),
            to,
            amount,
            1,
            nonce,
            21_000,
            1,
            vec![],
            1_700_000_050,
        );
        tx.signature = Some(keypair.sign_digest(&tx.hash).unwrap());
        tx
    }

    #[tokio::test]
    async fn test_produce_commits_to_both_stores() {
        let fx = fixture();
        bootstrap(&fx);
        fx.ledger
            .upsert_wallet(&WalletAccount {
                address: fx.keypair.address(),
                public_key: None,
                balance: 1_000,
                nonce: 0,
            })
            .unwrap();

        let alice = fx.keypair.clone();
        let bob = Address([0xB0; 20]);
        fx.mempool
            .add(signed_transfer(&alice, bob, 50, 1))
            .await
            .unwrap();

        let block = producer(&fx).produce().await.unwrap();
        assert_eq!(block.height, 1);
        assert_eq!(block.tx_count, 1);
        assert_eq!(fx.chain.tip().unwrap(), (1, block.hash));
        assert_eq!(fx.ledger.max_height().unwrap(), Some(1));

        // S1 arithmetic: 1000 − 50 − 1 fee, nonce advanced.
        let sender = fx.ledger.get_wallet(&alice.address()).unwrap().unwrap();
        assert_eq!(sender.balance, 949);
        assert_eq!(sender.nonce, 1);
        assert_eq!(fx.ledger.get_wallet(&bob).unwrap().unwrap().balance, 50);

        // Included transaction left the mempool.
        assert!(fx.mempool.is_empty());
    }

    #[tokio::test]
    async fn test_produce_announces_block_added() {
        let fx = fixture();
        bootstrap(&fx);
        let mut sub = fx
            .bus
            .subscribe_stream(shared_bus::EventFilter::topics(vec![shared_bus::EventTopic::Chain]));

        let block = producer(&fx).produce().await.unwrap();
        match sub.recv().await.unwrap() {
            ChainEvent::BlockAdded {
                block_hash,
                block_height,
                block: payload,
            } => {
                assert_eq!(block_hash, block.hash);
                assert_eq!(block_height, 1);
                assert!(payload.is_some());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_produce_discards_overspending_candidates() {
        let fx = fixture();
        bootstrap(&fx);
        fx.ledger
            .upsert_wallet(&WalletAccount {
                address: fx.keypair.address(),
                public_key: None,
                balance: 60,
                nonce: 0,
            })
            .unwrap();

        let bob = Address([0xB0; 20]);
        // First spends 51 of 60; the second cannot be covered.
        fx.mempool
            .add(signed_transfer(&fx.keypair, bob, 50, 1))
            .await
            .unwrap();
        fx.mempool
            .add(signed_transfer(&fx.keypair, bob, 50, 2))
            .await
            .unwrap();

        let block = producer(&fx).produce().await.unwrap();
        assert_eq!(block.tx_count, 1);
        assert_eq!(block.transactions[0].nonce, 1);
    }

    #[tokio::test]
    async fn test_not_our_slot() {
        let fx = fixture();
        bootstrap(&fx);
        // Replace the validator set with a different active validator.
        let other = Validator {
            address: Address([0xEE; 20]),
            stake: 1_000,
            status: ValidatorStatus::Active,
            reputation: 0,
        };
        fx.ledger
            .upsert_validator(&Validator {
                address: fx.keypair.address(),
                stake: 1_000,
                status: ValidatorStatus::Jailed,
                reputation: 0,
            })
            .unwrap();
        fx.ledger.upsert_validator(&other).unwrap();

        let result = producer(&fx).produce().await;
        assert!(matches!(result, Err(ProductionError::NotOurSlot { .. })));
    }

    #[tokio::test]
    async fn test_produced_block_signature_recovers_to_producer() {
        let fx = fixture();
        bootstrap(&fx);
        let block = producer(&fx).produce().await.unwrap();
        let sig = block.signature.as_deref().unwrap();
        let recovered = shared_types::TransactionVerifier::recover(
            &RecoveringVerifier,
            &block.hash,
            sig,
        );
        assert_eq!(recovered, Some(fx.keypair.address()));
        let _: Hash = block.hash;
    }
}
