//! # Ledger DB - Relational Projection of the Chain
//!
//! A queryable mirror of the canonical chain over RocksDB: blocks,
//! transactions, wallets, validators, staking, contracts, mempool rows,
//! peer nodes, and monitoring logs, each in its own column family.
//!
//! ## Authority Split
//!
//! The binary chain store owns committed history; this projection is the
//! authority for mutable state (wallets, validators, mempool rows). On
//! disagreement about committed blocks, the projection is reset from the
//! binary store.
//!
//! ## Atomicity
//!
//! All rows driven by one incoming block are committed in a single
//! `WriteBatch`, so readers observe either none or all of a block's
//! effects.

pub mod dual;
pub mod errors;
pub mod schema;
pub mod state;
pub mod store;

pub use dual::{CrossStoreReport, DualStoreSync};
pub use errors::LedgerError;
pub use schema::{BlockRow, MempoolRow, MonitoringRow, TxRow};
pub use state::StateView;
pub use store::LedgerDb;
