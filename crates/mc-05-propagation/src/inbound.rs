//! # Ingress Pipeline
//!
//! Receiver side of event propagation. Order of checks:
//!
//! 1. HMAC signature over the raw body (when a secret is configured)
//! 2. body decode (plain JSON, or base64 + gzip detected by first byte)
//! 3. envelope shape
//! 4. dedup by event id (a duplicate is success, not an error)
//! 5. per-source rate limit
//! 6. dispatch into the in-process bus

use std::io::Read;
use std::sync::Arc;

use flate2::read::GzDecoder;
use tracing::{debug, warn};

use shared_bus::{ChainEvent, DedupCache, EventBus};
use shared_types::envelope::verify_body;
use shared_types::TimeSource;

use crate::config::PropagationConfig;
use crate::errors::IngressError;
use crate::ratelimit::SourceRateLimiter;

/// One received event delivery.
#[derive(Debug, Clone)]
pub struct IngressRequest {
    /// Raw request body as received.
    pub body: Vec<u8>,
    /// Value of `X-Broadcast-Signature`, if present.
    pub signature: Option<String>,
}

/// Terminal status of an accepted delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressStatus {
    /// Dispatched into the bus.
    Processed,
    /// Seen within the dedup TTL; no side effects.
    Duplicate,
}

impl IngressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "success",
            Self::Duplicate => "duplicate",
        }
    }
}

/// Outcome of an accepted delivery.
#[derive(Debug, Clone)]
pub struct IngressOutcome {
    pub status: IngressStatus,
    pub event_type: String,
    pub event_id: String,
    pub source_node: String,
    pub processing_time_ms: u64,
}

/// The receiving pipeline, shared by the gateway's event endpoint.
pub struct IngressPipeline {
    config: PropagationConfig,
    bus: Arc<EventBus>,
    dedup: Arc<DedupCache>,
    limiter: SourceRateLimiter,
    time: Arc<dyn TimeSource>,
}

impl IngressPipeline {
    pub fn new(
        config: PropagationConfig,
        bus: Arc<EventBus>,
        dedup: Arc<DedupCache>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let limiter =
            SourceRateLimiter::new(config.rate_limit_per_minute, config.rate_limit_burst);
        Self {
            config,
            bus,
            dedup,
            limiter,
            time,
        }
    }

    pub fn dedup(&self) -> &Arc<DedupCache> {
        &self.dedup
    }

    /// Run one delivery through the pipeline.
    pub async fn process(&self, request: IngressRequest) -> Result<IngressOutcome, IngressError> {
        let started = std::time::Instant::now();

        if let Some(secret) = self.config.broadcast_secret.as_deref() {
            let signature = request
                .signature
                .as_deref()
                .ok_or(IngressError::MissingSignature)?;
            if !verify_body(&request.body, signature, secret) {
                return Err(IngressError::InvalidSignature);
            }
        }

        let json = decode_body(&request.body)?;
        let value: serde_json::Value = serde_json::from_slice(&json)
            .map_err(|e| IngressError::MalformedBody(e.to_string()))?;

        let event_type = required_str(&value, "type")?.to_string();
        let event_id = required_str(&value, "event_id")?.to_string();
        let source_node = required_str(&value, "source_node")?.to_string();
        if value.get("timestamp").and_then(|t| t.as_u64()).is_none() {
            return Err(IngressError::MissingField("timestamp"));
        }
        let data = value
            .get("data")
            .cloned()
            .ok_or(IngressError::MissingField("data"))?;

        let now = self.time.now();
        if !self.dedup.insert_if_absent(&event_id, now) {
            debug!(event_id = %event_id, "duplicate event suppressed");
            return Ok(IngressOutcome {
                status: IngressStatus::Duplicate,
                event_type,
                event_id,
                source_node,
                processing_time_ms: started.elapsed().as_millis() as u64,
            });
        }

        if !self.limiter.try_acquire(&source_node) {
            warn!(source = %source_node, "event rate limit exceeded");
            return Err(IngressError::RateLimited {
                source_id: source_node,
            });
        }

        let event = ChainEvent::from_wire(&event_type, &data)
            .ok_or_else(|| IngressError::UnrecognizedEvent(event_type.clone()))?;
        self.bus.publish(event).await;

        Ok(IngressOutcome {
            status: IngressStatus::Processed,
            event_type,
            event_id,
            source_node,
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn required_str<'a>(
    value: &'a serde_json::Value,
    field: &'static str,
) -> Result<&'a str, IngressError> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or(IngressError::MissingField(field))
}

/// Decode a request body: `{` means plain JSON, anything else is
/// base64-encoded gzip.
fn decode_body(body: &[u8]) -> Result<Vec<u8>, IngressError> {
    if body.first() == Some(&b'{') {
        return Ok(body.to_vec());
    }
    let text = std::str::from_utf8(body)
        .map_err(|_| IngressError::MalformedBody("body is neither JSON nor base64".into()))?;
    let compressed = base64::decode(text.trim())
        .map_err(|e| IngressError::MalformedBody(format!("base64: {e}")))?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| IngressError::MalformedBody(format!("gzip: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::encode_gzip_base64;
    use shared_types::clock::ManualTimeSource;
    use shared_types::envelope::{sign_body, EventEnvelope};

    fn envelope_body(event_type: &str, data: serde_json::Value, source: &str) -> Vec<u8> {
        let envelope = EventEnvelope::new(event_type, data, source, 1_700_000_000);
        serde_json::to_vec(&envelope).unwrap()
    }

    fn pipeline(secret: Option<&[u8]>) -> (Arc<EventBus>, IngressPipeline) {
        let bus = Arc::new(EventBus::new());
        let config = PropagationConfig {
            node_id: "local".into(),
            broadcast_secret: secret.map(|s| s.to_vec()),
            ..Default::default()
        };
        let pipeline = IngressPipeline::new(
            config,
            bus.clone(),
            Arc::new(DedupCache::new()),
            Arc::new(ManualTimeSource::new(1_700_000_000)),
        );
        (bus, pipeline)
    }

    fn heartbeat_body(source: &str) -> Vec<u8> {
        envelope_body(
            "heartbeat",
            serde_json::json!({
                "block_height": 5, "mempool_size": 2,
                "timestamp": 1_700_000_000u64, "node_id": source,
            }),
            source,
        )
    }

    #[tokio::test]
    async fn test_processes_valid_event() {
        let (bus, pipeline) = pipeline(None);
        let mut sub = bus.subscribe_stream(shared_bus::EventFilter::all());

        let outcome = pipeline
            .process(IngressRequest {
                body: heartbeat_body("peer-1"),
                signature: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.status, IngressStatus::Processed);
        assert_eq!(outcome.event_type, "heartbeat");
        assert_eq!(sub.recv().await.unwrap().event_type(), "heartbeat");
    }

    #[tokio::test]
    async fn test_duplicate_suppressed_without_side_effects() {
        let (bus, pipeline) = pipeline(None);
        let body = heartbeat_body("peer-1");
        pipeline
            .process(IngressRequest { body: body.clone(), signature: None })
            .await
            .unwrap();
        let events_before = bus.events_published();

        let outcome = pipeline
            .process(IngressRequest { body, signature: None })
            .await
            .unwrap();
        assert_eq!(outcome.status, IngressStatus::Duplicate);
        assert_eq!(outcome.status.as_str(), "duplicate");
        assert_eq!(bus.events_published(), events_before);
    }

    #[tokio::test]
    async fn test_signature_required_when_secret_configured() {
        let (_bus, pipeline) = pipeline(Some(b"secret"));
        let body = heartbeat_body("peer-1");

        let unsigned = pipeline
            .process(IngressRequest { body: body.clone(), signature: None })
            .await;
        assert!(matches!(unsigned, Err(IngressError::MissingSignature)));

        let mis_signed = pipeline
            .process(IngressRequest {
                body: body.clone(),
                signature: Some(sign_body(&body, b"wrong")),
            })
            .await;
        assert!(matches!(mis_signed, Err(IngressError::InvalidSignature)));

        let signed = pipeline
            .process(IngressRequest {
                signature: Some(sign_body(&body, b"secret")),
                body,
            })
            .await
            .unwrap();
        assert_eq!(signed.status, IngressStatus::Processed);
    }

    #[tokio::test]
    async fn test_gzip_base64_body_accepted() {
        let (_bus, pipeline) = pipeline(None);
        let body = encode_gzip_base64(&heartbeat_body("peer-1"));
        let outcome = pipeline
            .process(IngressRequest { body, signature: None })
            .await
            .unwrap();
        assert_eq!(outcome.status, IngressStatus::Processed);
    }

    #[tokio::test]
    async fn test_rate_limit_enforced_per_source() {
        let bus = Arc::new(EventBus::new());
        let config = PropagationConfig {
            rate_limit_per_minute: 60,
            rate_limit_burst: 2,
            ..Default::default()
        };
        let pipeline = IngressPipeline::new(
            config,
            bus,
            Arc::new(DedupCache::new()),
            Arc::new(ManualTimeSource::new(1_700_000_000)),
        );

        // Distinct payloads so dedup does not swallow them first.
        for height in 0..2u64 {
            let body = envelope_body(
                "heartbeat",
                serde_json::json!({
                    "block_height": height, "mempool_size": 0,
                    "timestamp": 1_700_000_000u64, "node_id": "spammy",
                }),
                "spammy",
            );
            pipeline
                .process(IngressRequest { body, signature: None })
                .await
                .unwrap();
        }

        let body = envelope_body(
            "heartbeat",
            serde_json::json!({
                "block_height": 9u64, "mempool_size": 0,
                "timestamp": 1_700_000_000u64, "node_id": "spammy",
            }),
            "spammy",
        );
        let result = pipeline.process(IngressRequest { body, signature: None }).await;
        assert!(matches!(result, Err(IngressError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let (_bus, pipeline) = pipeline(None);
        let body = br#"{"type":"heartbeat","data":{}}"#.to_vec();
        let result = pipeline.process(IngressRequest { body, signature: None }).await;
        assert!(matches!(result, Err(IngressError::MissingField(_))));
    }

    #[tokio::test]
    async fn test_unknown_event_type_rejected() {
        let (_bus, pipeline) = pipeline(None);
        let body = envelope_body("mystery.event", serde_json::json!({}), "peer-1");
        let result = pipeline.process(IngressRequest { body, signature: None }).await;
        assert!(matches!(result, Err(IngressError::UnrecognizedEvent(t)) if t == "mystery.event"));
    }

    #[tokio::test]
    async fn test_garbage_body_rejected() {
        let (_bus, pipeline) = pipeline(None);
        let result = pipeline
            .process(IngressRequest { body: b"!!!not-a-body!!!".to_vec(), signature: None })
            .await;
        assert!(matches!(result, Err(IngressError::MalformedBody(_))));
    }
}
