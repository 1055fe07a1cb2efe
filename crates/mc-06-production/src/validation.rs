//! # Incoming Block Validation
//!
//! The full acceptance pipeline for a block received from the network.
//! Every check runs before any state is touched; a failure rejects the
//! block with no side effects.
//!
//! Order: structure → linkage → timestamp skew → producer assignment →
//! producer signature → transaction validity → state application.

use std::sync::Arc;

use tracing::{debug, info};

use mc_02_chain_store::ChainStore;
use mc_03_ledger_db::{LedgerDb, StateView};
use mc_04_mempool::Mempool;
use shared_bus::{ChainEvent, EventBus};
use shared_types::{Block, TimeSource, TransactionVerifier, WalletAccount};

use crate::config::ProductionConfig;
use crate::errors::ProductionError;
use crate::intake::BlockIntake;
use crate::selector::ProducerSelector;

/// Validates and applies blocks received from peers.
pub struct BlockValidator {
    config: ProductionConfig,
    chain: Arc<ChainStore>,
    ledger: Arc<LedgerDb>,
    mempool: Arc<Mempool>,
    bus: Arc<EventBus>,
    verifier: Arc<dyn TransactionVerifier>,
    selector: Arc<dyn ProducerSelector>,
    time: Arc<dyn TimeSource>,
}

impl BlockValidator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ProductionConfig,
        chain: Arc<ChainStore>,
        ledger: Arc<LedgerDb>,
        mempool: Arc<Mempool>,
        bus: Arc<EventBus>,
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
            verifier,
            selector,
            time,
        }
    }

    /// Run the full pipeline without side effects. Returns the wallet
    /// states the block produces, ready for the atomic commit.
    pub fn validate(&self, block: &Block) -> Result<Vec<WalletAccount>, ProductionError> {
        block.validate_structure()?;

        // An empty chain accepts its first block without linkage: the
        // genesis block, or a mid-chain block after a snapshot or
        // checkpoint bootstrap.
        if let Some(parent) = self.chain.last()? {
            block.validate_linkage(&parent)?;
        }

        let now = self.time.now();
        if block.timestamp > now + self.config.acceptable_skew_secs {
            return Err(ProductionError::TimestampBeyondSkew {
                timestamp: block.timestamp,
                now,
                skew: self.config.acceptable_skew_secs,
            });
        }

        let validators = self.ledger.validators()?;
        let producer_entry = validators.iter().find(|v| v.address == block.validator);
        if !producer_entry.map(|v| v.is_active()).unwrap_or(false) {
            return Err(ProductionError::ProducerInactive {
                producer: block.validator,
            });
        }
        let expected = self
            .selector
            .select_producer(block.height, &block.parent_hash, &validators)
            .ok_or(ProductionError::NoActiveValidators)?;
        if expected != block.validator {
            return Err(ProductionError::ProducerMismatch {
                expected,
                actual: block.validator,
            });
        }

        let signature = block
            .signature
            .as_deref()
            .ok_or(ProductionError::SignatureInvalid)?;
        if !self.verifier.verify(&block.hash, signature, &block.validator) {
            return Err(ProductionError::SignatureInvalid);
        }

        let mut view = StateView::over(self.ledger.as_ref());
        for (index, tx) in block.transactions.iter().enumerate() {
            tx.validate(self.verifier.as_ref())
                .map_err(|e| ProductionError::TransactionInvalid {
                    index,
                    reason: e.to_string(),
                })?;
            view.apply_transaction(tx)
                .map_err(|e| ProductionError::StateViolation {
                    index,
                    reason: e.to_string(),
                })?;
        }

        debug!(height = block.height, "block validated");
        Ok(view.into_accounts())
    }

    /// Validate, commit to both stores, clear included transactions
    /// from the mempool, and announce. Drives the intake state machine
    /// to its terminal state.
    pub async fn validate_and_apply(&self, block: &Block) -> Result<(), ProductionError> {
        let mut intake = BlockIntake::new(block.hash);
        intake.header_received();

        let wallets = match self.validate(block) {
            Ok(wallets) => wallets,
            Err(e) => {
                intake.rejected();
                return Err(e);
            }
        };
        intake.validated();

        self.chain.append(block)?;
        self.ledger
            .commit_block(block, &wallets)
            .map_err(ProductionError::LedgerDesync)?;
        intake.applied();

        for tx in &block.transactions {
            self.mempool.remove(&tx.hash).await;
        }

        self.bus
            .publish(ChainEvent::BlockAdded {
                block_hash: block.hash,
                block_height: block.height,
                block: None,
            })
            .await;
        intake.announced();

        info!(
            height = block.height,
            hash = %shared_types::normalize::format_hash(&block.hash),
            "block applied"
        );
        Ok(())
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
    use shared_types::{Address, Validator, ValidatorStatus};

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
        keypair: Arc<NodeKeyPair>,
        time: Arc<ManualTimeSource>,
        validator: BlockValidator,
        genesis: Block,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(ChainStore::open(StoreConfig::new(dir.path().join("bin"))).unwrap());
        let ledger = Arc::new(LedgerDb::open(&dir.path().join("db")).unwrap());
        let bus = Arc::new(EventBus::new());
        let time = Arc::new(ManualTimeSource::new(1_700_000_100));
        let keypair = Arc::new(NodeKeyPair::generate());
        let mempool = Arc::new(Mempool::new(
            MempoolConfig::default(),
            bus.clone(),
            Arc::new(RecoveringVerifier),
            Arc::new(LedgerNonces(ledger.clone())),
            time.clone(),
        ));

        let genesis = Block::genesis(1_700_000_000, keypair.address());
        chain.append(&genesis).unwrap();
        ledger.commit_block(&genesis, &[]).unwrap();
        ledger
            .upsert_validator(&Validator {
                address: keypair.address(),
                stake: 1_000,
                status: ValidatorStatus::Active,
                reputation: 0,
            })
            .unwrap();

        let validator = BlockValidator::new(
            ProductionConfig::default(),
            chain.clone(),
            ledger.clone(),
            mempool,
            bus,
            Arc::new(RecoveringVerifier),
            Arc::new(StakeWeightedSelector),
            time.clone(),
        );
        Fixture {
            _dir: dir,
            chain,
            ledger,
            keypair,
            time,
            validator,
            genesis,
        }
    }

    fn signed_child(fx: &Fixture, timestamp: u64) -> Block {
        let mut block = Block::assemble(
            1,
            fx.genesis.hash,
            timestamp,
            fx.keypair.address(),
            vec![],
        );
        block.signature = Some(fx.keypair.sign_digest(&block.hash).unwrap());
        block
    }

    #[tokio::test]
    async fn test_valid_block_applies() {
        let fx = fixture();
        let block = signed_child(&fx, 1_700_000_050);
        fx.validator.validate_and_apply(&block).await.unwrap();
        assert_eq!(fx.chain.tip().unwrap(), (1, block.hash));
        assert_eq!(fx.ledger.max_height().unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_unsigned_block_rejected_without_side_effects() {
        let fx = fixture();
        let mut block = signed_child(&fx, 1_700_000_050);
        block.signature = None;
        let result = fx.validator.validate_and_apply(&block).await;
        assert!(matches!(result, Err(ProductionError::SignatureInvalid)));
        assert_eq!(fx.chain.tip().unwrap().0, 0);
        assert_eq!(fx.ledger.max_height().unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_wrong_signer_rejected() {
        let fx = fixture();
        let intruder = NodeKeyPair::generate();
        let mut block = Block::assemble(
            1,
            fx.genesis.hash,
            1_700_000_050,
            fx.keypair.address(),
            vec![],
        );
        block.signature = Some(intruder.sign_digest(&block.hash).unwrap());
        assert!(matches!(
            fx.validator.validate(&block),
            Err(ProductionError::SignatureInvalid)
        ));
    }

    #[tokio::test]
    async fn test_future_timestamp_rejected() {
        let fx = fixture();
        // 120s of skew is allowed; 200s is not.
        let block = signed_child(&fx, fx.time.now() + 200);
        assert!(matches!(
            fx.validator.validate(&block),
            Err(ProductionError::TimestampBeyondSkew { .. })
        ));
    }

    #[tokio::test]
    async fn test_inactive_producer_rejected() {
        let fx = fixture();
        fx.ledger
            .upsert_validator(&Validator {
                address: fx.keypair.address(),
                stake: 1_000,
                status: ValidatorStatus::Jailed,
                reputation: 0,
            })
            .unwrap();
        let block = signed_child(&fx, 1_700_000_050);
        assert!(matches!(
            fx.validator.validate(&block),
            Err(ProductionError::ProducerInactive { .. })
        ));
    }

    #[tokio::test]
    async fn test_overspending_block_rejected() {
        let fx = fixture();
        // No balance exists for the sender.
        let mut tx = shared_types::Transaction::new(
            fx.keypair.address(),
            Address([0xB0; 20]),
            1_000,
            1,
            1,
            21_000,
            1,
            vec![],
            1_700_000_010,
        );
        tx.signature = Some(fx.keypair.sign_digest(&tx.hash).unwrap());
        let mut block = Block::assemble(
            1,
            fx.genesis.hash,
            1_700_000_050,
            fx.keypair.address(),
            vec![tx],
        );
        block.signature = Some(fx.keypair.sign_digest(&block.hash).unwrap());

        assert!(matches!(
            fx.validator.validate(&block),
            Err(ProductionError::StateViolation { index: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_tampered_merkle_rejected() {
        let fx = fixture();
        let mut block = signed_child(&fx, 1_700_000_050);
        block.merkle_root = [0xEE; 32];
        assert!(matches!(
            fx.validator.validate(&block),
            Err(ProductionError::InvalidBlock(_))
        ));
    }
}
