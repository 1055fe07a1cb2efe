//! Ingress pipeline errors, mapped onto HTTP statuses by the gateway.

use thiserror::Error;

/// Rejections from the inbound event pipeline. A duplicate is not an
/// error; it surfaces as a successful `IngressStatus::Duplicate`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngressError {
    /// Body is not valid JSON (after optional base64+gzip decode).
    #[error("malformed body: {0}")]
    MalformedBody(String),

    /// Envelope is missing a required field.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Unknown event type or payload missing its required data fields.
    #[error("unrecognized event: {0}")]
    UnrecognizedEvent(String),

    /// Signature header absent while a secret is configured.
    #[error("missing broadcast signature")]
    MissingSignature,

    /// Signature did not verify.
    #[error("invalid broadcast signature")]
    InvalidSignature,

    /// Source exceeded its event budget.
    #[error("rate limited: {source_id}")]
    RateLimited { source_id: String },

    /// Internal dispatch failure.
    #[error("internal: {0}")]
    Internal(String),
}

impl IngressError {
    /// The HTTP status the gateway maps this rejection to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::MalformedBody(_)
            | Self::MissingField(_)
            | Self::UnrecognizedEvent(_) => 400,
            Self::MissingSignature | Self::InvalidSignature => 401,
            Self::RateLimited { .. } => 429,
            Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(IngressError::MissingField("type").http_status(), 400);
        assert_eq!(IngressError::InvalidSignature.http_status(), 401);
        assert_eq!(
            IngressError::RateLimited { source_id: "n".into() }.http_status(),
            429
        );
        assert_eq!(IngressError::Internal("x".into()).http_status(), 500);
    }
}
