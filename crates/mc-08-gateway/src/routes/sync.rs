//! Sync RPC: block ranges, snapshots, headers, single blocks, and fork
//! checks.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use shared_types::{normalize, Block, BlockHeader, StateSnapshot};

use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RangeRequest {
    pub start_height: u64,
    pub end_height: u64,
    #[serde(default)]
    pub requester_node: Option<String>,
}

/// `POST /sync/range`
pub async fn range(
    State(state): State<AppState>,
    Json(request): Json<RangeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.end_height < request.start_height {
        return Err(ApiError::bad_request("end_height below start_height"));
    }
    let span = request.end_height - request.start_height + 1;
    if span > state.max_range_blocks {
        return Err(ApiError::bad_request(format!(
            "range of {span} blocks exceeds limit {}",
            state.max_range_blocks
        ))
        .with_context(json!({ "limit": state.max_range_blocks })));
    }

    let mut blocks: Vec<Block> = Vec::with_capacity(span as usize);
    for height in request.start_height..=request.end_height {
        blocks.push(state.chain.get(height)?);
    }
    tracing::debug!(
        start = request.start_height,
        end = request.end_height,
        requester = request.requester_node.as_deref().unwrap_or("unknown"),
        "range served"
    );
    Ok(Json(json!({ "blocks": blocks })))
}

#[derive(Debug, Deserialize)]
pub struct HeightQuery {
    pub height: u64,
}

/// `GET /sync/snapshot?height=H`
pub async fn snapshot(
    State(state): State<AppState>,
    Query(query): Query<HeightQuery>,
) -> Result<Vec<u8>, ApiError> {
    let mut snapshot = StateSnapshot {
        height: query.height,
        state_root: [0u8; 32],
        accounts: state.ledger.wallets()?,
        validators: state.ledger.validators()?,
        contracts: state.ledger.contracts()?,
    };
    snapshot.state_root = snapshot.compute_state_root();
    bincode::serialize(&snapshot).map_err(|e| ApiError::internal(e.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct HeaderRange {
    pub start: u64,
    pub end: u64,
}

/// `GET /sync/headers?start=..&end=..`
pub async fn headers(
    State(state): State<AppState>,
    Query(query): Query<HeaderRange>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if query.end < query.start {
        return Err(ApiError::bad_request("end below start"));
    }
    if query.end - query.start + 1 > state.max_range_blocks {
        return Err(ApiError::bad_request("header range too large"));
    }
    let mut headers: Vec<BlockHeader> = Vec::new();
    for height in query.start..=query.end {
        headers.push(state.chain.get(height)?.header());
    }
    Ok(Json(json!({ "headers": headers })))
}

#[derive(Debug, Deserialize)]
pub struct BlockQuery {
    pub height: Option<u64>,
    pub hash: Option<String>,
}

/// `GET /block?height=N` or `GET /block?hash=H`
pub async fn block(
    State(state): State<AppState>,
    Query(query): Query<BlockQuery>,
) -> Result<Json<Block>, ApiError> {
    match (query.height, query.hash) {
        (Some(height), _) => Ok(Json(state.chain.get(height)?)),
        (None, Some(hash)) => {
            let digest = normalize::parse_hash(&hash)
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            Ok(Json(state.chain.get_by_hash(&digest)?))
        }
        (None, None) => Err(ApiError::bad_request("height or hash required")),
    }
}

#[derive(Debug, Deserialize)]
pub struct ForkCheckRequest {
    pub height: u64,
}

/// `POST /sync/fork_check`
pub async fn fork_check(
    State(state): State<AppState>,
    Json(request): Json<ForkCheckRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let block = state.chain.get(request.height)?;
    Ok(Json(json!({ "hash": normalize::format_hash(&block.hash) })))
}
