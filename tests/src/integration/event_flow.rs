//! Cross-node event propagation: signed fan-out, at-most-once effect
//! within the dedup TTL, and per-source rate limiting over HTTP.

use shared_bus::{ChainEvent, EventFilter, EventTopic};
use shared_types::envelope::{sign_body, EventEnvelope};

use crate::harness::{seed_of, start_node};

#[tokio::test]
async fn broadcast_reaches_peer_exactly_once() {
    let receiver = start_node("recv-node", None, vec![]).await;
    let sender = start_node("send-node", None, vec![seed_of(&receiver)]).await;

    let mut network_events = receiver
        .node
        .bus
        .subscribe_stream(EventFilter::topics(vec![EventTopic::Network]));

    let event = ChainEvent::Heartbeat {
        block_height: 7,
        mempool_size: 2,
        timestamp: 1_700_000_000,
        node_id: sender.node.config.node_id.clone(),
    };

    // Same event content and timestamp: the second delivery carries the
    // same event id and must be suppressed at the receiver.
    let first = sender.node.propagator.broadcast(&event, 1_700_000_000).await;
    assert_eq!(first.targets, 1);
    assert_eq!(first.delivered, 1);
    let second = sender.node.propagator.broadcast(&event, 1_700_000_000).await;
    assert_eq!(second.delivered, 1, "duplicate still answers 200");

    let received = network_events.recv().await.unwrap();
    assert_eq!(received.event_type(), "heartbeat");
    assert!(
        network_events.try_recv().is_none(),
        "duplicate produced no second dispatch"
    );
}

#[tokio::test]
async fn signed_ingress_rejects_wrong_secret() {
    // Receiver requires a secret.
    let receiver = crate::harness::start_node_full(
        "secure-node",
        None,
        vec![],
        Some("right-secret".to_string()),
    )
    .await;

    let envelope = EventEnvelope::new(
        "heartbeat",
        serde_json::json!({
            "block_height": 1, "mempool_size": 0,
            "timestamp": 1_700_000_000u64, "node_id": "peer-x",
        }),
        "peer-x",
        1_700_000_000,
    );
    let body = serde_json::to_vec(&envelope).unwrap();
    let client = reqwest::Client::new();

    // Wrong secret: 401.
    let response = client
        .post(format!("{}/sync/events", receiver.url))
        .header("X-Broadcast-Signature", sign_body(&body, b"wrong-secret"))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    // Missing signature: 401.
    let response = client
        .post(format!("{}/sync/events", receiver.url))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    // Correct secret: accepted.
    let response = client
        .post(format!("{}/sync/events", receiver.url))
        .header("X-Broadcast-Signature", sign_body(&body, b"right-secret"))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn burst_beyond_rate_limit_answers_429() {
    let receiver = start_node("limited-node", None, vec![]).await;
    let client = reqwest::Client::new();

    let mut saw_429 = false;
    // Burst capacity is 10; distinct payloads dodge the dedup store.
    for height in 0..12u64 {
        let envelope = EventEnvelope::new(
            "heartbeat",
            serde_json::json!({
                "block_height": height, "mempool_size": 0,
                "timestamp": 1_700_000_000u64, "node_id": "flooder",
            }),
            "flooder",
            1_700_000_000 + height,
        );
        let response = client
            .post(format!("{}/sync/events", receiver.url))
            .json(&envelope)
            .send()
            .await
            .unwrap();
        if response.status().as_u16() == 429 {
            saw_429 = true;
        }
    }
    assert!(saw_429, "flooding source was never limited");
}
