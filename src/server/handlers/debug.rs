use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    #[serde(default)]
    pub q: String,
}

pub async fn debug_context(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
) -> impl IntoResponse {
    Json(state.pipeline.debug_context(&query.q).await)
}
