//! Node status: `GET /health` and `GET /status`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// `GET /health` — quick status, suitable for probes.
pub async fn health(State(state): State<AppState>) -> Response {
    let quick = state.status.quick();
    let status = if quick.ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(quick)).into_response()
}

/// `GET /status` — full status including component checks and a peer
/// snapshot.
pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut full = state.status.full();
    let stats = state.chain.stats();

    // Keys the sync protocol reads directly.
    full["node_id"] = json!(state.node_id);
    full["tip_height"] = json!(stats.tip_height);
    full["block_count"] = json!(stats.block_count);
    full["mempool_size"] = json!(state.mempool.len());
    full["peers"] = json!(state.monitor.snapshot_all());
    Json(full)
}
