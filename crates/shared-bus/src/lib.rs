//! # Shared Bus - Event Bus for Inter-Subsystem Communication
//!
//! All inter-subsystem communication flows through the bus: the producer
//! publishes, the sync engine subscribes, and neither depends on the
//! other's concrete type.
//!
//! ## Dispatch Model
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Producer     │                    │ Sync Engine  │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! Registered handlers run in registration order for every published
//! event; a handler error is logged and does not block the rest.
//! Long-running consumers can instead take a broadcast stream.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod dedup;
pub mod events;
pub mod publisher;
pub mod subscriber;

pub use dedup::DedupCache;
pub use events::{ChainEvent, EventFilter, EventTopic};
pub use publisher::{EventBus, EventHandler, HandlerError};
pub use subscriber::{EventStream, Subscription};

/// Maximum events buffered per stream subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Default time-to-live for dedup entries (15 minutes).
pub const DEDUP_TTL_SECS: u64 = 900;
