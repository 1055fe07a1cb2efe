//! Delivery priority classes.
//!
//! Priority governs the delivery timeout and retry budget only; there
//! is no ordering guarantee across classes.

use std::time::Duration;

/// Priority classes, wire-encoded as `X-Event-Priority: 1..4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

impl Priority {
    /// Wire value for the `X-Event-Priority` header.
    pub fn as_header(self) -> u8 {
        match self {
            Self::Critical => 1,
            Self::High => 2,
            Self::Normal => 3,
            Self::Low => 4,
        }
    }

    /// Parse the header value; unknown values default to `Normal`.
    pub fn from_header(value: u8) -> Self {
        match value {
            1 => Self::Critical,
            2 => Self::High,
            4 => Self::Low,
            _ => Self::Normal,
        }
    }

    /// Per-request delivery timeout for this class.
    pub fn timeout(self) -> Duration {
        match self {
            Self::Critical => Duration::from_secs(10),
            Self::High => Duration::from_secs(7),
            Self::Normal => Duration::from_secs(5),
            Self::Low => Duration::from_secs(3),
        }
    }

    /// Delivery attempts per peer for this class.
    pub fn attempts(self) -> u32 {
        match self {
            Self::Critical => 3,
            Self::High => 2,
            Self::Normal | Self::Low => 1,
        }
    }

    /// The class used for an event type.
    pub fn for_event_type(event_type: &str) -> Self {
        match event_type {
            "fork.detected" => Self::Critical,
            "block.added" | "sync.gap_detected" => Self::High,
            "transaction.propagate" => Self::Normal,
            _ => Self::Low,
        }
    }
}
