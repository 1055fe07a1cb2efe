//! API error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use mc_05_propagation::IngressError;

/// A client-facing error with its HTTP status.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub context: Option<serde_json::Value>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            context: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            context: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "status": "error",
            "message": self.message,
            "context": self.context,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<IngressError> for ApiError {
    fn from(e: IngressError) -> Self {
        Self {
            status: StatusCode::from_u16(e.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: e.to_string(),
            context: None,
        }
    }
}

impl From<mc_02_chain_store::StoreError> for ApiError {
    fn from(e: mc_02_chain_store::StoreError) -> Self {
        match e {
            mc_02_chain_store::StoreError::NotFound { .. }
            | mc_02_chain_store::StoreError::HashNotFound { .. } => Self::not_found(e.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<mc_03_ledger_db::LedgerError> for ApiError {
    fn from(e: mc_03_ledger_db::LedgerError) -> Self {
        match e {
            mc_03_ledger_db::LedgerError::NotFound(_) => Self::not_found(e.to_string()),
            mc_03_ledger_db::LedgerError::Model(m) => Self::bad_request(m.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}
