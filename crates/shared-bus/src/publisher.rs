//! # Event Bus
//!
//! Ordered handler dispatch plus broadcast streams for long-running
//! consumers.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::events::{ChainEvent, EventFilter};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;

/// Error returned by a handler. The bus logs it and moves on.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A subscriber invoked inline for every matching event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in dispatch logs.
    fn name(&self) -> &str;

    /// Handle one event. Errors are logged by the bus, never propagated
    /// to the publisher or to later handlers.
    async fn handle(&self, event: &ChainEvent) -> Result<(), HandlerError>;
}

struct Registration {
    filter: EventFilter,
    handler: Arc<dyn EventHandler>,
}

/// The in-process event bus.
///
/// `publish` drives registered handlers sequentially in registration
/// order, then fans the event out to broadcast stream subscribers.
pub struct EventBus {
    handlers: RwLock<Vec<Registration>>,
    sender: broadcast::Sender<ChainEvent>,
    events_published: std::sync::atomic::AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            handlers: RwLock::new(Vec::new()),
            sender,
            events_published: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Register a handler for events matching `filter`. Handlers run in
    /// registration order.
    pub fn subscribe(&self, filter: EventFilter, handler: Arc<dyn EventHandler>) {
        debug!(handler = handler.name(), topics = ?filter.topics, "handler registered");
        self.handlers.write().push(Registration { filter, handler });
    }

    /// Open a broadcast stream for events matching `filter`.
    pub fn subscribe_stream(&self, filter: EventFilter) -> Subscription {
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Publish an event: run handlers in order, then notify streams.
    ///
    /// Returns the number of handlers that accepted the event.
    pub async fn publish(&self, event: ChainEvent) -> usize {
        self.events_published
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        // Snapshot under the lock, dispatch outside it: a handler may
        // publish follow-up events.
        let matching: Vec<Arc<dyn EventHandler>> = {
            let handlers = self.handlers.read();
            handlers
                .iter()
                .filter(|r| r.filter.matches(&event))
                .map(|r| r.handler.clone())
                .collect()
        };

        let mut delivered = 0usize;
        for handler in &matching {
            match handler.handle(&event).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        handler = handler.name(),
                        event = event.event_type(),
                        error = %e,
                        "event handler failed"
                    );
                }
            }
        }

        // Stream subscribers; an empty receiver set is not an error.
        let _ = self.sender.send(event);

        delivered
    }

    /// Total events published since startup.
    pub fn events_published(&self) -> u64 {
        self.events_published
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Number of registered inline handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        name: String,
        order: Arc<parking_lot::Mutex<Vec<String>>>,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, _event: &ChainEvent) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.order.lock().push(self.name.clone());
            if self.fail {
                Err(HandlerError::new("boom"))
            } else {
                Ok(())
            }
        }
    }

    fn heartbeat() -> ChainEvent {
        ChainEvent::Heartbeat {
            block_height: 1,
            mempool_size: 0,
            timestamp: 0,
            node_id: "n".into(),
        }
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            bus.subscribe(
                EventFilter::all(),
                Arc::new(Recorder {
                    name: name.into(),
                    order: order.clone(),
                    fail: false,
                    calls: AtomicUsize::new(0),
                }),
            );
        }
        bus.publish(heartbeat()).await;
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_block_others() {
        let bus = EventBus::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        bus.subscribe(
            EventFilter::all(),
            Arc::new(Recorder {
                name: "failing".into(),
                order: order.clone(),
                fail: true,
                calls: AtomicUsize::new(0),
            }),
        );
        bus.subscribe(
            EventFilter::all(),
            Arc::new(Recorder {
                name: "after".into(),
                order: order.clone(),
                fail: false,
                calls: AtomicUsize::new(0),
            }),
        );
        let delivered = bus.publish(heartbeat()).await;
        assert_eq!(delivered, 1);
        assert_eq!(*order.lock(), vec!["failing", "after"]);
    }

    #[tokio::test]
    async fn test_filter_skips_unrelated_handlers() {
        let bus = EventBus::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        bus.subscribe(
            EventFilter::topics(vec![EventTopic::Sync]),
            Arc::new(Recorder {
                name: "sync-only".into(),
                order: order.clone(),
                fail: false,
                calls: AtomicUsize::new(0),
            }),
        );
        bus.publish(heartbeat()).await;
        assert!(order.lock().is_empty());
    }

    #[tokio::test]
    async fn test_stream_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_stream(EventFilter::all());
        bus.publish(heartbeat()).await;
        let received = sub.recv().await.unwrap();
        assert_eq!(received.event_type(), "heartbeat");
    }

    #[tokio::test]
    async fn test_publish_counts() {
        let bus = EventBus::new();
        bus.publish(heartbeat()).await;
        bus.publish(heartbeat()).await;
        assert_eq!(bus.events_published(), 2);
    }
}
