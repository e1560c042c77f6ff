use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::types::ChatRequest;

const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider call timed out")]
    Timeout,
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("could not decode provider response: {0}")]
    Decode(String),
    #[error("embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("provider is not configured")]
    NotConfigured,
}

impl ProviderError {
    pub fn http(status: u16, body: &str) -> Self {
        ProviderError::Http {
            status,
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::http(status.as_u16(), &err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Turns query text into a vector in the index's embedding space.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError>;

    /// chat completion (streaming); dropping the receiver cancels the call
    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError>;
}
