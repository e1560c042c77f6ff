use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    Json(state.pipeline.list_documents(query.limit, query.offset).await)
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.pipeline.get_document(&id).await?))
}

pub async fn document_types(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "types": state.pipeline.document_types().await }))
}

pub async fn document_years(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "years": state.pipeline.document_years().await }))
}

pub async fn document_authors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "authors": state.pipeline.document_authors().await }))
}
