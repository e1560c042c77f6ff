pub mod openai;
pub mod provider;
pub mod types;

#[cfg(test)]
mod tests;

pub use openai::OpenAiCompatibleProvider;
pub use provider::{EmbeddingProvider, LlmProvider, ProviderError};
pub use types::{ChatMessage, ChatRequest};
