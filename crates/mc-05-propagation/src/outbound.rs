//! # Outbound Fan-Out
//!
//! Wraps a bus event in a signed envelope and delivers it to every
//! eligible peer. Concurrency is bounded by a semaphore; each delivery
//! carries the priority class's timeout. Failures mark peer health and
//! the breaker but never propagate to the caller.

use std::io::Write;
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use mc_01_peer_health::{CircuitBreaker, HealthMonitor, LoadBalancer, ProbeOutcome};
use shared_bus::ChainEvent;
use shared_types::envelope::{sign_body, EventEnvelope};

use crate::config::PropagationConfig;
use crate::priority::Priority;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    pub targets: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Signed event fan-out to peers.
pub struct Propagator {
    config: PropagationConfig,
    client: reqwest::Client,
    balancer: Arc<LoadBalancer>,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<Semaphore>,
}

impl Propagator {
    pub fn new(
        config: PropagationConfig,
        balancer: Arc<LoadBalancer>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let limiter = Arc::new(Semaphore::new(config.fanout_concurrency));
        Self {
            config,
            client: reqwest::Client::new(),
            balancer,
            breaker,
            limiter,
        }
    }

    /// Build the signed wire envelope for `event` at `timestamp`.
    pub fn envelope(&self, event: &ChainEvent, timestamp: u64) -> EventEnvelope {
        EventEnvelope::new(
            event.event_type(),
            event.data_json(),
            self.config.node_id.clone(),
            timestamp,
        )
    }

    /// Deliver `event` to every healthy-or-degraded peer. Returns once
    /// all deliveries finished or timed out; spawn this when true
    /// fire-and-forget behavior is needed.
    pub async fn broadcast(&self, event: &ChainEvent, timestamp: u64) -> BroadcastReport {
        let envelope = self.envelope(event, timestamp);
        let priority = Priority::for_event_type(&envelope.event_type);

        let body = match serde_json::to_vec(&envelope) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "envelope serialization failed; dropping broadcast");
                return BroadcastReport::default();
            }
        };
        let body = if body.len() > self.config.compress_threshold {
            encode_gzip_base64(&body)
        } else {
            body
        };
        let signature = self
            .config
            .broadcast_secret
            .as_deref()
            .map(|secret| sign_body(&body, secret));

        let peers = self.balancer.eligible();
        let mut report = BroadcastReport {
            targets: peers.len(),
            ..Default::default()
        };

        let deliveries = peers.into_iter().map(|peer| {
            let envelope = &envelope;
            let body = body.clone();
            let signature = signature.clone();
            async move {
                let _permit = match self.limiter.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return false,
                };
                self.deliver(&peer.node_id, &peer.url, envelope, body, signature, priority)
                    .await
            }
        });

        for delivered in join_all(deliveries).await {
            if delivered {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }

        debug!(
            event = %envelope.event_type,
            event_id = %envelope.event_id,
            delivered = report.delivered,
            failed = report.failed,
            "broadcast complete"
        );
        report
    }

    async fn deliver(
        &self,
        node_id: &str,
        url: &str,
        envelope: &EventEnvelope,
        body: Vec<u8>,
        signature: Option<String>,
        priority: Priority,
    ) -> bool {
        const OPERATION: &str = "event_delivery";
        if !self.breaker.should_allow(node_id, OPERATION) {
            return false;
        }

        let monitor: &Arc<HealthMonitor> = self.balancer.monitor();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = std::time::Instant::now();
            let mut request = self
                .client
                .post(format!("{url}/sync/events"))
                .header("Content-Type", "application/json")
                .header("X-Event-Type", envelope.event_type.clone())
                .header("X-Event-Id", envelope.event_id.clone())
                .header("X-Event-Priority", priority.as_header().to_string())
                .header("X-Source-Node", envelope.source_node.clone())
                .timeout(priority.timeout())
                .body(body.clone());
            if let Some(signature) = &signature {
                request = request.header("X-Broadcast-Signature", signature.clone());
            }

            let result = request.send().await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let ok = matches!(&result, Ok(resp) if resp.status().is_success());

            monitor.record(
                node_id,
                ProbeOutcome {
                    success: ok,
                    response_ms: elapsed_ms,
                },
                shared_types::clock::now_unix(),
            );

            if ok {
                self.breaker.record_success(node_id, OPERATION);
                return true;
            }
            self.breaker.record_failure(node_id, OPERATION);
            if attempt >= priority.attempts() {
                warn!(peer = node_id, event = %envelope.event_type, attempt, "delivery failed");
                return false;
            }
        }
    }
}

/// gzip then base64 a JSON body. The receiver detects the encoding by
/// the first byte.
pub fn encode_gzip_base64(body: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writing to a Vec cannot fail.
    let _ = encoder.write_all(body);
    let compressed = encoder.finish().unwrap_or_default();
    base64::encode(compressed).into_bytes()
}
