//! Router assembly with the tower layer stack.

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::routes::{events, node, sync};
use crate::state::AppState;

/// Maximum accepted request body.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Request deadline for every route.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the node's HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/sync/events", post(events::receive_event))
        .route("/sync/range", post(sync::range))
        .route("/sync/snapshot", get(sync::snapshot))
        .route("/sync/headers", get(sync::headers))
        .route("/sync/fork_check", post(sync::fork_check))
        .route("/block", get(sync::block))
        .route("/health", get(node::health))
        .route("/status", get(node::status))
        .route("/node/status-update", post(events::receive_status_update))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{QuickStatus, StatusSource};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use mc_01_peer_health::{HealthMonitor, PeerNetConfig};
    use mc_02_chain_store::{ChainStore, StoreConfig};
    use mc_03_ledger_db::LedgerDb;
    use mc_04_mempool::{Mempool, MempoolConfig, NonceProvider};
    use mc_05_propagation::{IngressPipeline, PropagationConfig};
    use shared_bus::{DedupCache, EventBus};
    use shared_crypto::RecoveringVerifier;
    use shared_types::clock::ManualTimeSource;
    use shared_types::envelope::EventEnvelope;
    use shared_types::{Address, Block, NodeStatus};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct ZeroNonces;
    impl NonceProvider for ZeroNonces {
        fn confirmed_nonce(&self, _address: &Address) -> u64 {
            0
        }
    }

    struct StaticStatus;
    impl StatusSource for StaticStatus {
        fn quick(&self) -> QuickStatus {
            QuickStatus {
                ok: true,
                status: NodeStatus::Healthy,
                tip_height: Some(0),
            }
        }
        fn full(&self) -> serde_json::Value {
            serde_json::json!({ "components": { "chain": "ok" } })
        }
    }

    fn app() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(ChainStore::open(StoreConfig::new(dir.path().join("bin"))).unwrap());
        chain
            .append(&Block::genesis(1_700_000_000, Address([9; 20])))
            .unwrap();
        let ledger = Arc::new(LedgerDb::open(&dir.path().join("db")).unwrap());
        let bus = Arc::new(EventBus::new());
        let time = Arc::new(ManualTimeSource::new(1_700_000_100));
        let mempool = Arc::new(Mempool::new(
            MempoolConfig::default(),
            bus.clone(),
            Arc::new(RecoveringVerifier),
            Arc::new(ZeroNonces),
            time.clone(),
        ));
        let ingress = Arc::new(IngressPipeline::new(
            PropagationConfig::default(),
            bus,
            Arc::new(DedupCache::new()),
            time,
        ));
        let monitor = Arc::new(HealthMonitor::new(&PeerNetConfig::default()));

        let state = AppState {
            node_id: "node-test".into(),
            ingress,
            chain,
            ledger,
            mempool,
            monitor,
            status: Arc::new(StaticStatus),
            max_range_blocks: 100,
        };
        (dir, build_router(state))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_dir, app) = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_status_includes_tip_height() {
        let (_dir, app) = app();
        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["tip_height"], 0);
        assert_eq!(body["node_id"], "node-test");
        assert!(body["components"].is_object());
    }

    #[tokio::test]
    async fn test_block_by_height_and_hash() {
        let (_dir, app) = app();
        let response = app
            .clone()
            .oneshot(Request::get("/block?height=0").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let hash = body["hash"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/block?hash={hash}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/block?height=99").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fork_check() {
        let (_dir, app) = app();
        let response = app
            .oneshot(
                Request::post("/sync/fork_check")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"height":0}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["hash"].as_str().unwrap().starts_with("0x"));
    }

    #[tokio::test]
    async fn test_range_validation() {
        let (_dir, app) = app();
        let response = app
            .clone()
            .oneshot(
                Request::post("/sync/range")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"start_height":0,"end_height":0,"requester_node":"n"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["blocks"].as_array().unwrap().len(), 1);

        let response = app
            .oneshot(
                Request::post("/sync/range")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"start_height":0,"end_height":5000}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_event_ingress_and_duplicate() {
        let (_dir, app) = app();
        let envelope = EventEnvelope::new(
            "heartbeat",
            serde_json::json!({
                "block_height": 1, "mempool_size": 0,
                "timestamp": 1_700_000_000u64, "node_id": "peer-1",
            }),
            "peer-1",
            1_700_000_000,
        );
        let body = serde_json::to_string(&envelope).unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::post("/sync/events")
                    .header("content-type", "application/json")
                    .body(Body::from(body.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first = body_json(response).await;
        assert_eq!(first["status"], "success");
        assert!(first["processed_at"].is_string());

        let response = app
            .oneshot(
                Request::post("/sync/events")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let second = body_json(response).await;
        assert_eq!(second["status"], "duplicate");
    }

    #[tokio::test]
    async fn test_event_ingress_rejects_missing_fields() {
        let (_dir, app) = app();
        let response = app
            .oneshot(
                Request::post("/sync/events")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"type":"heartbeat"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_headers_endpoint() {
        let (_dir, app) = app();
        let response = app
            .oneshot(
                Request::get("/sync/headers?start=0&end=0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["headers"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_round_trips_through_bincode() {
        let (_dir, app) = app();
        let response = app
            .oneshot(
                Request::get("/sync/snapshot?height=0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let snapshot: shared_types::StateSnapshot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(snapshot.compute_state_root(), snapshot.state_root);
    }
}
