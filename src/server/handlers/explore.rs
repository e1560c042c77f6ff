use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TimelineQuery {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EntityQuery {
    pub entity_type: Option<String>,
    pub limit: Option<usize>,
}

pub async fn timeline(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimelineQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .pipeline
            .timeline(query.start_year, query.end_year)
            .await?,
    ))
}

pub async fn entities(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EntityQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .pipeline
            .entities(query.entity_type.as_deref(), query.limit)
            .await?,
    ))
}

pub async fn map(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.pipeline.map_locations().await)
}
