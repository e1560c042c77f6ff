//! Typed view over the merged `config.yml` + `secrets.yaml` document.
//!
//! Every section defaults independently, so an empty config file yields a
//! usable lexical-only service.

use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub data: DataSettings,
    pub retrieval: RetrievalSettings,
    pub context: ContextSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub web: WebSettings,
}

impl Settings {
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env::var("PORT").ok().and_then(|v| v.parse::<u16>().ok()) {
            self.server.port = port;
        }

        let env_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        if self.llm.api_key.is_none() {
            self.llm.api_key = env_key.clone();
        }
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = env_key;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub store_path: String,
    pub index_path: String,
    pub mapping_path: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            store_path: "knowledge_base.db".to_string(),
            index_path: "vector_index/index.bin".to_string(),
            mapping_path: "vector_index/mapping.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// Extra vector candidates fetched per requested result when post-filters
    /// or document-level dedup may discard some of them.
    pub candidate_multiplier: usize,
    pub min_term_length: usize,
    /// `true` treats the index as document-granular: chunk hits of the same
    /// document collapse to the best-ranked one.
    pub dedup_documents: bool,
    pub year_min: i32,
    pub year_max: i32,
    pub lexical_limit: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 50,
            candidate_multiplier: 3,
            min_term_length: 3,
            dedup_documents: false,
            year_min: 1300,
            year_max: 2029,
            lexical_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    pub max_documents: usize,
    pub max_chars_per_document: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_documents: 5,
            max_chars_per_document: 800,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_sources: usize,
    pub system_prompt: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 500,
            timeout_secs: 30,
            max_sources: 3,
            system_prompt: None,
        }
    }
}

impl LlmSettings {
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() || self.api_key.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl EmbeddingSettings {
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() || self.api_key.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSettings {
    pub enabled: bool,
    pub provider: String,
    pub google_search_api_key: Option<String>,
    pub google_search_engine_id: Option<String>,
    pub brave_search_api_key: Option<String>,
    pub bing_search_api_key: Option<String>,
    pub max_results: usize,
    pub timeout_secs: u64,
    pub max_bytes: usize,
    pub snippet_chars: usize,
    pub url_denylist: Vec<String>,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "duckduckgo".to_string(),
            google_search_api_key: None,
            google_search_engine_id: None,
            brave_search_api_key: None,
            bing_search_api_key: None,
            max_results: 3,
            timeout_secs: 10,
            max_bytes: 2 * 1024 * 1024,
            snippet_chars: 300,
            url_denylist: Vec::new(),
        }
    }
}

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_yields_defaults() {
        let settings: Settings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings.retrieval.default_top_k, 5);
        assert_eq!(settings.llm.max_sources, 3);
        assert!(!settings.web.enabled);
        assert!(!settings.llm.is_configured());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let settings: Settings = serde_json::from_value(json!({
            "retrieval": { "dedup_documents": true },
            "llm": { "base_url": "http://localhost:1234" }
        }))
        .unwrap();
        assert!(settings.retrieval.dedup_documents);
        assert_eq!(settings.retrieval.year_min, 1300);
        assert!(settings.llm.is_configured());
        assert_eq!(settings.llm.model, "gpt-4o-mini");
    }
}
