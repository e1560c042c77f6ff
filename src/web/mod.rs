//! Web Fallback Retriever and its collaborators.

pub mod fetch;
pub mod retriever;
pub mod search;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use fetch::HttpPageFetcher;
pub use retriever::WebFallbackRetriever;
pub use search::ConfiguredWebSearch;

#[derive(Debug, Error)]
pub enum WebError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch target is not allowed: {0}")]
    Blocked(String),
    #[error("web request returned HTTP {0}")]
    Http(u16),
    #[error("web transport error: {0}")]
    Transport(String),
    #[error("response exceeded {0} bytes")]
    TooLarge(usize),
    #[error("web request timed out")]
    Timeout,
}

impl From<reqwest::Error> for WebError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WebError::Timeout
        } else if let Some(status) = err.status() {
            WebError::Http(status.as_u16())
        } else {
            WebError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub title: Option<String>,
    pub text: String,
}

/// External page summary handed to the context assembler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// `false` for placeholders standing in for a failed fetch.
    pub fetched: bool,
}

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, WebError>;
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, WebError>;
}
