//! # Stream Subscriptions
//!
//! Broadcast-backed event streams for long-running consumers (sync
//! worker, propagation loop). A lagging subscriber drops the oldest
//! events rather than stalling the bus.

use tokio::sync::broadcast;
use tracing::warn;

use crate::events::{ChainEvent, EventFilter};

/// A filtered receiver of bus events.
pub struct Subscription {
    receiver: broadcast::Receiver<ChainEvent>,
    filter: EventFilter,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<ChainEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event.
    ///
    /// Returns `None` when the bus is dropped. Lagged events are skipped
    /// with a warning.
    pub async fn recv(&mut self) -> Option<ChainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscription lagged; events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive of the next matching event, if one is queued.
    pub fn try_recv(&mut self) -> Option<ChainEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Adapter exposing a subscription as a `futures`-style stream.
pub struct EventStream {
    inner: Subscription,
}

impl EventStream {
    pub fn new(inner: Subscription) -> Self {
        Self { inner }
    }

    /// Next matching event, or `None` when the bus closed.
    pub async fn next(&mut self) -> Option<ChainEvent> {
        self.inner.recv().await
    }
}
