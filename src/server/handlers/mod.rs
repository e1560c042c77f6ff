pub mod ask;
pub mod config;
pub mod debug;
pub mod documents;
pub mod explore;
pub mod health;
pub mod search;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::core::errors::ApiError;

/// Malformed bodies surface as `{"error": ...}` like every other failure.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}
