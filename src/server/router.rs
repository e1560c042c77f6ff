use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::config::settings::ServerSettings;
use crate::server::handlers::{ask, config, debug, documents, explore, health, search};
use crate::state::AppState;

/// Creates the application router: query API, document browsing, corpus
/// exploration and diagnostics, behind CORS and access logging.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings.server);
    Router::new()
        .route("/health", get(health::health))
        .route("/api/stats", get(health::stats))
        .route("/api/config", get(config::get_config))
        .route("/api/search", post(search::search))
        .route("/api/documents", get(documents::list_documents))
        .route("/api/documents/types", get(documents::document_types))
        .route("/api/documents/years", get(documents::document_years))
        .route("/api/documents/authors", get(documents::document_authors))
        .route("/api/documents/:id", get(documents::get_document))
        .route("/api/timeline", get(explore::timeline))
        .route("/api/entities", get(explore::entities))
        .route("/api/map", get(explore::map))
        .route("/api/ask", post(ask::ask))
        .route("/api/ask/stream", post(ask::ask_stream))
        .route("/api/debug/context", get(debug::debug_context))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(server: &ServerSettings) -> CorsLayer {
    let allowed_origins = resolve_allowed_origins(server)
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

fn resolve_allowed_origins(server: &ServerSettings) -> Vec<String> {
    let origins: Vec<String> = server
        .cors_allowed_origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect();

    if origins.is_empty() {
        return default_local_origins();
    }

    origins
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
        "http://localhost:8000".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
        "http://127.0.0.1:8000".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_origins_replace_local_defaults() {
        let server = ServerSettings {
            cors_allowed_origins: vec![" https://annals.example.org ".to_string(), "".to_string()],
            ..ServerSettings::default()
        };
        assert_eq!(resolve_allowed_origins(&server), vec!["https://annals.example.org"]);
        assert_eq!(
            resolve_allowed_origins(&ServerSettings::default()),
            default_local_origins()
        );
    }
}
