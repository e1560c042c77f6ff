use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

/// Faults absorbed by the query path.
///
/// None of these reach a caller as an error; they are logged and surfaced in
/// per-query diagnostics so degraded responses stay explainable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RetrievalFault {
    IndexUnavailable(String),
    StoreUnavailable(String),
    ProviderFailure(String),
    InconsistentIndex { skipped: usize },
    MalformedQuery,
}

impl std::fmt::Display for RetrievalFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalFault::IndexUnavailable(reason) => write!(f, "index unavailable: {}", reason),
            RetrievalFault::StoreUnavailable(reason) => write!(f, "store unavailable: {}", reason),
            RetrievalFault::ProviderFailure(reason) => write!(f, "provider failure: {}", reason),
            RetrievalFault::InconsistentIndex { skipped } => {
                write!(f, "inconsistent index: {} positions skipped", skipped)
            }
            RetrievalFault::MalformedQuery => write!(f, "malformed query"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn api_error_maps_to_status_codes() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::ServiceUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn retrieval_fault_serializes_with_kind_tag() {
        let value = serde_json::to_value(RetrievalFault::InconsistentIndex { skipped: 2 }).unwrap();
        assert_eq!(value["kind"], "inconsistent_index");
        assert_eq!(value["detail"]["skipped"], 2);
    }
}
