//! # Mempool Service
//!
//! Wraps the pool in its mutex and emits bus events for admissions and
//! removals. The lock covers only the in-memory mutation; event
//! publication happens after the lock is released, and no network or
//! disk I/O ever runs under it.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use shared_bus::{ChainEvent, EventBus};
use shared_types::{Address, Hash, TimeSource, Transaction, TransactionVerifier};

use crate::entities::{MempoolConfig, MempoolEntry};
use crate::errors::MempoolError;
use crate::pool::{AddOutcome, NonceGap, TransactionPool};

/// Source of confirmed account nonces (the ledger projection).
pub trait NonceProvider: Send + Sync {
    fn confirmed_nonce(&self, address: &Address) -> u64;
}

/// The shared mempool service.
pub struct Mempool {
    pool: Mutex<TransactionPool>,
    bus: Arc<EventBus>,
    verifier: Arc<dyn TransactionVerifier>,
    nonces: Arc<dyn NonceProvider>,
    time: Arc<dyn TimeSource>,
}

impl Mempool {
    pub fn new(
        config: MempoolConfig,
        bus: Arc<EventBus>,
        verifier: Arc<dyn TransactionVerifier>,
        nonces: Arc<dyn NonceProvider>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            pool: Mutex::new(TransactionPool::new(config)),
            bus,
            verifier,
            nonces,
            time,
        }
    }

    /// Admit a transaction and announce the admission.
    pub async fn add(&self, tx: Transaction) -> Result<AddOutcome, MempoolError> {
        let now = self.time.now();
        let confirmed = self.nonces.confirmed_nonce(&tx.from);
        let tx_hash = tx.hash;

        let (outcome, size) = {
            let mut pool = self.pool.lock();
            let outcome = pool.add(tx, now, self.verifier.as_ref(), confirmed)?;
            (outcome, pool.len())
        };

        match &outcome {
            AddOutcome::Added { evicted } => {
                debug!(hash = %hex_short(&tx_hash), size, "transaction admitted");
                if let Some(evicted) = evicted {
                    self.bus
                        .publish(ChainEvent::MempoolTransactionRemoved {
                            transaction_hash: *evicted,
                            mempool_size: size,
                        })
                        .await;
                }
            }
            AddOutcome::Replaced { replaced } => {
                info!(
                    replaced = %hex_short(replaced),
                    with = %hex_short(&tx_hash),
                    "transaction replaced by fee"
                );
                self.bus
                    .publish(ChainEvent::MempoolTransactionRemoved {
                        transaction_hash: *replaced,
                        mempool_size: size,
                    })
                    .await;
            }
        }

        self.bus
            .publish(ChainEvent::MempoolTransactionAdded {
                transaction_hash: tx_hash,
                mempool_size: size,
            })
            .await;
        Ok(outcome)
    }

    /// Remove a transaction after block inclusion. Silent for unknown
    /// hashes (another path already removed it).
    pub async fn remove(&self, hash: &Hash) -> Option<MempoolEntry> {
        let (entry, size) = {
            let mut pool = self.pool.lock();
            let entry = pool.remove(hash);
            (entry, pool.len())
        };
        if entry.is_some() {
            self.bus
                .publish(ChainEvent::MempoolTransactionRemoved {
                    transaction_hash: *hash,
                    mempool_size: size,
                })
                .await;
        }
        entry
    }

    /// Priority-ordered preview for the next block.
    pub fn get_for_block(&self, max_count: usize, max_gas: u64) -> Vec<Transaction> {
        let now = self.time.now();
        self.pool.lock().get_for_block(max_count, max_gas, now)
    }

    /// Periodic maintenance: refresh age bonuses, drop stale entries,
    /// and announce each removal.
    pub async fn cleanup(&self) -> Vec<MempoolEntry> {
        let now = self.time.now();
        let nonces = self.nonces.clone();
        let (removed, size) = {
            let mut pool = self.pool.lock();
            pool.refresh_priorities(now);
            let removed = pool.cleanup(now, self.verifier.as_ref(), &|address| {
                nonces.confirmed_nonce(address)
            });
            (removed, pool.len())
        };

        for entry in &removed {
            self.bus
                .publish(ChainEvent::MempoolTransactionRemoved {
                    transaction_hash: entry.transaction.hash,
                    mempool_size: size,
                })
                .await;
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), size, "mempool cleanup");
        }
        removed
    }

    /// Report `(sender, nonce)` keys holding more than one transaction.
    pub fn detect_double_spends(&self) -> Vec<(Address, u64, Vec<Hash>)> {
        self.pool.lock().detect_double_spends()
    }

    /// Report senders whose pending nonces are not contiguous with the
    /// confirmed nonce.
    pub fn validate_nonce_gaps(&self) -> Vec<NonceGap> {
        let nonces = self.nonces.clone();
        self.pool
            .lock()
            .validate_nonce_gaps(&|address| nonces.confirmed_nonce(address))
    }

    /// Reduced fee floor while syncing.
    pub fn set_sync_mode(&self, on: bool) {
        self.pool.lock().set_sync_mode(on);
    }

    pub fn len(&self) -> usize {
        self.pool.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.lock().is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.pool.lock().contains(hash)
    }

    /// Snapshot of all entries, for persistence into the ledger.
    pub fn snapshot(&self) -> Vec<MempoolEntry> {
        self.pool.lock().snapshot()
    }
}

fn hex_short(hash: &Hash) -> String {
    shared_types::normalize::format_hash(hash)[..10].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{EventFilter, EventTopic};
    use shared_types::clock::ManualTimeSource;

    struct FromRecovery;
    impl TransactionVerifier for FromRecovery {
        fn verify(&self, _digest: &Hash, signature: &[u8], _signer: &Address) -> bool {
            !signature.is_empty()
        }
        fn recover(&self, _digest: &Hash, signature: &[u8]) -> Option<Address> {
            let bytes: [u8; 20] = signature.get(..20)?.try_into().ok()?;
            Some(Address(bytes))
        }
    }

    struct ZeroNonces;
    impl NonceProvider for ZeroNonces {
        fn confirmed_nonce(&self, _address: &Address) -> u64 {
            0
        }
    }

    fn signed(from: Address, nonce: u64, fee: u64) -> Transaction {
        let mut tx = Transaction::new(
            from,
            Address([0xBB; 20]),
            10,
            fee,
            nonce,
            21_000,
            1,
            vec![],
            1_700_000_000,
        );
        let mut sig = vec![0u8; 65];
        sig[..20].copy_from_slice(from.as_bytes());
        tx.signature = Some(sig);
        tx
    }

    fn service(time: Arc<ManualTimeSource>) -> (Arc<EventBus>, Mempool) {
        let bus = Arc::new(EventBus::new());
        let mempool = Mempool::new(
            MempoolConfig::default(),
            bus.clone(),
            Arc::new(FromRecovery),
            Arc::new(ZeroNonces),
            time,
        );
        (bus, mempool)
    }

    #[tokio::test]
    async fn test_add_emits_admission_event() {
        let time = Arc::new(ManualTimeSource::new(100));
        let (bus, mempool) = service(time);
        let mut sub = bus.subscribe_stream(EventFilter::topics(vec![EventTopic::Mempool]));

        mempool.add(signed(Address([1; 20]), 1, 5)).await.unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.event_type(), "mempool.transaction.added");
        assert_eq!(mempool.len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_emits_removal_per_entry() {
        let time = Arc::new(ManualTimeSource::new(100));
        let (bus, mempool) = service(time.clone());
        mempool.add(signed(Address([1; 20]), 1, 5)).await.unwrap();
        mempool.add(signed(Address([2; 20]), 1, 5)).await.unwrap();

        let mut sub = bus.subscribe_stream(EventFilter::topics(vec![EventTopic::Mempool]));
        time.advance(4_000); // past the 3600s TTL
        let removed = mempool.cleanup().await;
        assert_eq!(removed.len(), 2);

        let mut removal_events = 0;
        while let Some(event) = sub.try_recv() {
            if event.event_type() == "mempool.transaction.removed" {
                removal_events += 1;
            }
        }
        assert_eq!(removal_events, 2);
        assert!(mempool.is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let time = Arc::new(ManualTimeSource::new(100));
        let (_bus, mempool) = service(time);
        let tx = signed(Address([1; 20]), 1, 5);
        let hash = tx.hash;
        mempool.add(tx).await.unwrap();

        assert!(mempool.remove(&hash).await.is_some());
        assert!(mempool.remove(&hash).await.is_none());
    }
}
