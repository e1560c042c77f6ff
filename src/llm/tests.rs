use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use super::openai::OpenAiCompatibleProvider;
use super::provider::{EmbeddingProvider, LlmProvider, ProviderError};
use super::types::{ChatMessage, ChatRequest};

const STREAM_BODY: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"Zheng \"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"He \"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"was...\"}}]}\n\n",
    "data: [DONE]\n\n",
);

async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/v1", addr)
}

async fn chat_completions(Json(body): Json<Value>) -> Response {
    if body["stream"].as_bool() == Some(true) {
        return ([(header::CONTENT_TYPE, "text/event-stream")], STREAM_BODY).into_response();
    }
    let question = body["messages"][1]["content"].as_str().unwrap_or_default();
    Json(json!({
        "choices": [{ "message": { "role": "assistant", "content": format!("echo: {}", question) } }]
    }))
    .into_response()
}

async fn embeddings(Json(body): Json<Value>) -> Json<Value> {
    let len = body["input"][0].as_str().unwrap_or_default().len() as f64;
    Json(json!({ "data": [{ "embedding": [len, 1.0, 0.0] }] }))
}

fn fake_openai() -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/embeddings", post(embeddings))
}

fn provider(base_url: &str, timeout: Duration) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new(base_url, Some("sk-test".to_string()), "gpt-4o-mini", timeout)
        .unwrap()
}

fn request() -> ChatRequest {
    ChatRequest::grounded("system".to_string(), "Who was Zheng He?")
}

#[tokio::test]
async fn blocking_chat_returns_message_content() {
    let base = spawn_server(fake_openai()).await;
    let answer = provider(&base, Duration::from_secs(5))
        .chat(request())
        .await
        .unwrap();
    assert_eq!(answer, "echo: Who was Zheng He?");
}

#[tokio::test]
async fn streaming_chat_yields_deltas_in_order() {
    let base = spawn_server(fake_openai()).await;
    let mut rx = provider(&base, Duration::from_secs(5))
        .stream_chat(request())
        .await
        .unwrap();

    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk.unwrap());
    }
    assert_eq!(chunks, vec!["Zheng ", "He ", "was..."]);
}

#[tokio::test]
async fn embed_returns_first_vector() {
    let base = spawn_server(fake_openai()).await;
    let vector = provider(&base, Duration::from_secs(5))
        .embed("ming")
        .await
        .unwrap();
    assert_eq!(vector, vec![4.0, 1.0, 0.0]);
}

#[tokio::test]
async fn quota_errors_surface_as_http_errors() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "quota exceeded") }),
    );
    let base = spawn_server(router).await;

    let err = provider(&base, Duration::from_secs(5))
        .chat(ChatRequest::new(vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();
    match err {
        ProviderError::Http { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "quota exceeded");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn slow_provider_times_out() {
    let router = Router::new().route(
        "/v1/embeddings",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({ "data": [] }))
        }),
    );
    let base = spawn_server(router).await;

    let err = provider(&base, Duration::from_millis(100))
        .embed("slow")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Timeout));
}
