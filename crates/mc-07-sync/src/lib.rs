//! # Sync Engine
//!
//! Keeps the local chain caught up with the network: strategy selection
//! (full / fast / light / checkpoint), gap resolution with batched
//! downloads, and fork detection with rollback and re-apply.
//!
//! Blocks are applied strictly at `local_height + 1`; out-of-order
//! arrivals wait in a pending buffer.

pub mod client;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fork;
pub mod headers;
pub mod strategy;

pub use client::SyncClient;
pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncReport};
pub use errors::SyncError;
pub use fork::{ForkOutcome, ForkResolver};
pub use headers::{verify_header_chain, verify_spv_proof};
pub use strategy::{choose_strategy, GapResolution, StrategyInputs, SyncStrategy};
