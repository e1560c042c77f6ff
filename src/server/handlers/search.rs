use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use super::json_body;
use crate::core::errors::ApiError;
use crate::rag::SearchRequest;
use crate::state::AppState;

pub async fn search(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(payload)?;
    Ok(Json(state.pipeline.search(&request).await?))
}
