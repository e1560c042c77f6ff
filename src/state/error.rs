use thiserror::Error;

use crate::core::errors::ApiError;
use crate::llm::ProviderError;
use crate::web::WebError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] ApiError),

    #[error("Failed to compile text patterns: {0}")]
    Patterns(#[from] regex::Error),

    #[error("Failed to configure model provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("Failed to configure web fallback: {0}")]
    Web(#[from] WebError),

    #[error("No data source: metadata store unavailable ({0}) and web fallback disabled")]
    NoDataSource(String),
}
