use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::annotate::{EntityAnnotator, EntityKind};
use super::answer::{AnswerEvent, AnswerGenerator, AnswerMode, Generation};
use super::context_builder::{excerpt, truncate_chars, AssembledContext, ContextAssembler, SourceCitation};
use super::explore::{self, EntityReport, MapReport, Timeline};
use super::retriever::{HybridRetriever, RetrievalResult, SearchFilters, SearchMode, SearchOptions};
use crate::core::errors::{ApiError, RetrievalFault};
use crate::store::{DocumentRecord, DocumentSummary, TypeCount};
use crate::web::{WebFallbackRetriever, WebResult};

const SEARCH_SNIPPET_CHARS: usize = 300;
const DEBUG_PREVIEW_CHARS: usize = 1200;
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub top_k: Option<i64>,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default)]
    pub dedup_documents: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHitView {
    pub document_id: String,
    pub title: String,
    pub author: String,
    pub year: Option<i32>,
    pub source_type: String,
    pub url: Option<String>,
    pub word_count: u32,
    pub snippet: String,
    /// Squared L2 distance for vector hits, `null` for lexical matches.
    pub relevance_score: Option<f32>,
}

impl From<&RetrievalResult> for SearchHitView {
    fn from(result: &RetrievalResult) -> Self {
        let doc = &result.document;
        Self {
            document_id: doc.id.clone(),
            title: doc.title.clone(),
            author: doc.author.clone(),
            year: doc.year,
            source_type: doc.doc_type.clone(),
            url: doc.url.clone(),
            word_count: doc.word_count,
            snippet: excerpt(doc.body(), SEARCH_SNIPPET_CHARS),
            relevance_score: result.relevance.score(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHitView>,
    pub count: usize,
    pub mode: SearchMode,
    pub strategy: &'static str,
    /// `no_data` when the metadata store could not be read.
    pub status: &'static str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AskMode {
    #[default]
    Auto,
    Documents,
    Web,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default = "default_true")]
    pub use_external_provider: bool,
    #[serde(default)]
    pub mode: AskMode,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            use_external_provider: true,
            mode: AskMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub confidence: f32,
    pub sources_used: usize,
    pub web_results: Vec<WebResult>,
    pub generation: Generation,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentList {
    pub documents: Vec<DocumentSummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    pub documents: usize,
    pub index_vectors: usize,
    pub index_loaded: bool,
    pub store_available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    #[serde(flatten)]
    pub health: HealthReport,
    pub documents_by_type: Vec<TypeCount>,
    pub index_dimension: Option<usize>,
    pub embedding_configured: bool,
    pub llm_configured: bool,
    pub web_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextDebugReport {
    pub query: String,
    pub docs_found: usize,
    pub doc_titles: Vec<String>,
    pub strategy: &'static str,
    pub index_loaded: bool,
    pub index_vectors: usize,
    pub store_size: usize,
    pub faults: Vec<RetrievalFault>,
    pub context_preview: String,
}

/// Retrieval, grounding and answering wired together for the HTTP layer.
pub struct RagPipeline {
    retriever: HybridRetriever,
    assembler: ContextAssembler,
    generator: AnswerGenerator,
    web: Option<WebFallbackRetriever>,
    web_limit: usize,
    entities: Option<Arc<dyn EntityAnnotator>>,
}

impl RagPipeline {
    pub fn new(
        retriever: HybridRetriever,
        assembler: ContextAssembler,
        generator: AnswerGenerator,
    ) -> Self {
        Self {
            retriever,
            assembler,
            generator,
            web: None,
            web_limit: 3,
            entities: None,
        }
    }

    pub fn with_web(mut self, web: Option<WebFallbackRetriever>, limit: usize) -> Self {
        self.web = web;
        self.web_limit = limit.max(1);
        self
    }

    pub fn with_entities(mut self, entities: Option<Arc<dyn EntityAnnotator>>) -> Self {
        self.entities = entities;
        self
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ApiError> {
        if let (Some(min), Some(max)) = (request.filters.year_min, request.filters.year_max) {
            if min > max {
                return Err(ApiError::BadRequest(format!(
                    "year_min ({}) must not exceed year_max ({})",
                    min, max
                )));
            }
        }

        let options = SearchOptions {
            top_k: request
                .top_k
                .unwrap_or(self.retriever.config().default_top_k as i64),
            filters: request.filters.clone(),
            mode: request.mode,
            dedup_documents: request.dedup_documents,
        };
        let outcome = self.retriever.search(&request.query, &options).await;
        let results: Vec<SearchHitView> = outcome.results.iter().map(SearchHitView::from).collect();

        Ok(SearchResponse {
            query: request.query.trim().to_string(),
            count: results.len(),
            results,
            mode: request.mode,
            strategy: outcome.diagnostics.strategy(),
            status: if outcome.diagnostics.store_unavailable() {
                "no_data"
            } else {
                "ok"
            },
        })
    }

    pub async fn ask(&self, request: &AskRequest) -> AskResponse {
        let started = Instant::now();
        let (context, web_results) = self.gather(&request.question, request.mode).await;
        let result = self
            .generator
            .answer(
                &request.question,
                &context,
                request.use_external_provider,
                AnswerMode::Blocking,
            )
            .await;

        info!(
            mode = ?request.mode,
            documents = context.cited().len(),
            web_results = web_results.len(),
            generation = ?result.generation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Answered question"
        );

        AskResponse {
            answer: result.answer,
            sources: result.sources,
            confidence: result.confidence,
            sources_used: context.cited().len(),
            web_results,
            generation: result.generation,
        }
    }

    /// Events arrive in order and always end with [`AnswerEvent::Done`]
    /// unless the receiver is dropped first.
    pub fn ask_stream(self: Arc<Self>, request: AskRequest) -> mpsc::Receiver<AnswerEvent> {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let started = Instant::now();
            let (context, web_results) = self.gather(&request.question, request.mode).await;
            let result = self
                .generator
                .answer(
                    &request.question,
                    &context,
                    request.use_external_provider,
                    AnswerMode::Streaming(tx),
                )
                .await;
            info!(
                mode = ?request.mode,
                documents = context.cited().len(),
                web_results = web_results.len(),
                generation = ?result.generation,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Streamed answer"
            );
        });
        rx
    }

    async fn gather(&self, question: &str, mode: AskMode) -> (AssembledContext, Vec<WebResult>) {
        let local = match mode {
            AskMode::Web => Vec::new(),
            AskMode::Auto | AskMode::Documents => {
                let options = SearchOptions::top_k(self.retriever.config().default_top_k as i64);
                self.retriever.search(question, &options).await.results
            }
        };

        let wants_web = match mode {
            AskMode::Web => true,
            AskMode::Auto => local.is_empty(),
            AskMode::Documents => false,
        };
        let web_results = match (&self.web, wants_web) {
            (Some(web), true) => web.search_web(question, self.web_limit).await,
            _ => Vec::new(),
        };

        (self.assembler.build(&local, &web_results), web_results)
    }

    pub async fn get_document(&self, id: &str) -> Result<DocumentRecord, ApiError> {
        let store = self.retriever.store().ok_or(ApiError::ServiceUnavailable)?;
        store
            .get_document(id.trim())
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Document '{}' not found", id)))
    }

    pub async fn list_documents(&self, limit: Option<usize>, offset: Option<usize>) -> DocumentList {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let offset = offset.unwrap_or(0);
        let (documents, total) = match self.retriever.store() {
            Some(store) => {
                let documents = store.list_documents(limit, offset).await.unwrap_or_else(|err| {
                    tracing::warn!("Listing documents failed: {}", err);
                    Vec::new()
                });
                (documents, store.count().await.unwrap_or(0))
            }
            None => (Vec::new(), 0),
        };
        DocumentList {
            documents,
            total,
            limit,
            offset,
        }
    }

    pub async fn document_types(&self) -> Vec<String> {
        match self.retriever.store() {
            Some(store) => facet_or_empty(store.document_types().await),
            None => Vec::new(),
        }
    }

    pub async fn document_years(&self) -> Vec<i32> {
        match self.retriever.store() {
            Some(store) => facet_or_empty(store.document_years().await),
            None => Vec::new(),
        }
    }

    pub async fn document_authors(&self) -> Vec<String> {
        match self.retriever.store() {
            Some(store) => facet_or_empty(store.document_authors().await),
            None => Vec::new(),
        }
    }

    pub async fn health(&self) -> HealthReport {
        let (documents, store_available) = match self.retriever.store() {
            Some(store) => match store.count().await {
                Ok(count) => (count, true),
                Err(err) => {
                    tracing::warn!("Metadata store health check failed: {}", err);
                    (0, false)
                }
            },
            None => (0, false),
        };
        HealthReport {
            status: if store_available { "ok" } else { "degraded" },
            timestamp: chrono::Utc::now().to_rfc3339(),
            documents,
            index_vectors: self.retriever.index_vectors(),
            index_loaded: self.retriever.index_loaded(),
            store_available,
        }
    }

    pub async fn stats(&self) -> StatsReport {
        let health = self.health().await;
        let documents_by_type = match self.retriever.store() {
            Some(store) if health.store_available => {
                store.counts_by_type().await.unwrap_or_default()
            }
            _ => Vec::new(),
        };
        StatsReport {
            health,
            documents_by_type,
            index_dimension: self.retriever.index_dimension(),
            embedding_configured: self.retriever.embedder_configured(),
            llm_configured: self.generator.has_model(),
            web_enabled: self.web.is_some(),
        }
    }

    pub async fn debug_context(&self, query: &str) -> ContextDebugReport {
        let options = SearchOptions::top_k(self.retriever.config().default_top_k as i64);
        let outcome = self.retriever.search(query, &options).await;
        let context = self.assembler.build(&outcome.results, &[]);
        let store_size = match self.retriever.store() {
            Some(store) => store.count().await.unwrap_or(0),
            None => 0,
        };

        ContextDebugReport {
            query: query.trim().to_string(),
            docs_found: outcome.results.len(),
            doc_titles: outcome
                .results
                .iter()
                .map(|r| r.document.title.clone())
                .collect(),
            strategy: outcome.diagnostics.strategy(),
            index_loaded: self.retriever.index_loaded(),
            index_vectors: self.retriever.index_vectors(),
            store_size,
            faults: outcome.diagnostics.faults,
            context_preview: context
                .text()
                .map(|text| truncate_chars(text, DEBUG_PREVIEW_CHARS).to_string())
                .unwrap_or_default(),
        }
    }

    pub async fn timeline(
        &self,
        start_year: Option<i32>,
        end_year: Option<i32>,
    ) -> Result<Timeline, ApiError> {
        if let (Some(start), Some(end)) = (start_year, end_year) {
            if start > end {
                return Err(ApiError::BadRequest(format!(
                    "start_year ({}) must not exceed end_year ({})",
                    start, end
                )));
            }
        }
        let documents = self.scan_corpus().await;
        Ok(explore::build_timeline(
            &documents,
            self.retriever.annotator().as_ref(),
            self.entities.as_deref(),
            start_year,
            end_year,
        ))
    }

    pub async fn entities(
        &self,
        kind: Option<&str>,
        limit: Option<usize>,
    ) -> Result<EntityReport, ApiError> {
        let kind = match kind.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(EntityKind::parse(raw).ok_or_else(|| {
                let known: Vec<&str> = EntityKind::ALL.iter().map(EntityKind::as_str).collect();
                ApiError::BadRequest(format!(
                    "Unknown entity_type '{}'; expected one of {}",
                    raw,
                    known.join(", ")
                ))
            })?),
            None => None,
        };
        let limit = limit
            .unwrap_or(explore::DEFAULT_ENTITY_LIMIT)
            .clamp(1, explore::MAX_ENTITY_LIMIT);

        let Some(annotator) = &self.entities else {
            return Ok(EntityReport::default());
        };
        let documents = self.scan_corpus().await;
        Ok(explore::count_entities(&documents, annotator.as_ref(), kind, limit))
    }

    pub async fn map_locations(&self) -> MapReport {
        let Some(annotator) = &self.entities else {
            return MapReport::default();
        };
        let documents = self.scan_corpus().await;
        explore::map_locations(&documents, annotator.as_ref())
    }

    /// Every stored record, page by page; a failing page ends the scan.
    async fn scan_corpus(&self) -> Vec<DocumentRecord> {
        let Some(store) = self.retriever.store() else {
            return Vec::new();
        };
        let mut documents: Vec<DocumentRecord> = Vec::new();
        loop {
            match store.scan_documents(MAX_LIST_LIMIT, documents.len()).await {
                Ok(page) => {
                    let done = page.len() < MAX_LIST_LIMIT;
                    documents.extend(page);
                    if done {
                        break;
                    }
                }
                Err(err) => {
                    warn!(scanned = documents.len(), "Corpus scan stopped: {}", err);
                    break;
                }
            }
        }
        documents
    }
}

fn facet_or_empty<T>(result: Result<Vec<T>, ApiError>) -> Vec<T> {
    result.unwrap_or_else(|err| {
        tracing::warn!("Facet query failed: {}", err);
        Vec::new()
    })
}
