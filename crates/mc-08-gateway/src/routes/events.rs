//! Event ingress: `POST /sync/events` and `POST /node/status-update`.
//!
//! Both endpoints share the ingress pipeline and its signing rules; the
//! status-update route simply expects `node.status_update` envelopes.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::json;

use mc_05_propagation::{IngressOutcome, IngressRequest};

use crate::errors::ApiError;
use crate::state::AppState;

fn signature_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get("X-Broadcast-Signature")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn outcome_response(outcome: IngressOutcome) -> Json<serde_json::Value> {
    Json(json!({
        "status": outcome.status.as_str(),
        "event_type": outcome.event_type,
        "event_id": outcome.event_id,
        "processed_at": chrono::Utc::now().to_rfc3339(),
        "processing_time": outcome.processing_time_ms,
    }))
}

/// `POST /sync/events`
pub async fn receive_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .ingress
        .process(IngressRequest {
            body: body.to_vec(),
            signature: signature_header(&headers),
        })
        .await?;
    Ok(outcome_response(outcome))
}

/// `POST /node/status-update`
pub async fn receive_status_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .ingress
        .process(IngressRequest {
            body: body.to_vec(),
            signature: signature_header(&headers),
        })
        .await?;
    if outcome.event_type != "node.status_update" {
        return Err(ApiError::bad_request(format!(
            "expected node.status_update, got {}",
            outcome.event_type
        )));
    }
    Ok(outcome_response(outcome))
}
