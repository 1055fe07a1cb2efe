//! # Meridian Chain Node Runtime
//!
//! Wires the subsystems together over the event bus, owns the node's
//! lifecycle (health, recovery, shutdown), and runs the background
//! loops: heartbeat, mempool maintenance, peer probing, block
//! production, and sync.

pub mod config;
pub mod lifecycle;
pub mod logs;
pub mod recovery;
pub mod tasks;
pub mod wiring;

pub use config::NodeConfig;
pub use lifecycle::Lifecycle;
pub use recovery::{AutoRecovery, RecoveryOutcome};
pub use wiring::Node;
