//! # Block Production & Validation
//!
//! The producer side assembles, signs, and commits blocks when this
//! node holds the slot; the validation side runs incoming blocks
//! through the full acceptance pipeline before they touch either store.
//!
//! ## Intake state machine
//!
//! ```text
//! idle → received_header → validated → applied → announced
//!                  │             │
//!                  └→ rejected ←─┘
//! ```

pub mod config;
pub mod errors;
pub mod fork_choice;
pub mod intake;
pub mod producer;
pub mod selector;
pub mod validation;

pub use config::ProductionConfig;
pub use errors::ProductionError;
pub use fork_choice::{chain_weight, prefer_remote, ChainWeight};
pub use intake::{BlockIntake, IntakeState};
pub use producer::BlockProducer;
pub use selector::{ProducerSelector, StakeWeightedSelector};
pub use validation::BlockValidator;
