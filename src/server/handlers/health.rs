use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.pipeline.health().await)
}

pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.pipeline.stats().await)
}
