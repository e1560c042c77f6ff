//! Hybrid Retriever: vector search joined against the Metadata Store, with a
//! lexical fallback and supplement.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::annotate::TextAnnotator;
use crate::core::config::settings::RetrievalSettings;
use crate::core::errors::RetrievalFault;
use crate::index::{IndexBundle, IndexError};
use crate::llm::{EmbeddingProvider, ProviderError};
use crate::store::{DocumentRecord, DocumentStore};

/// Distances and lexical matches are not commensurate; never compare across variants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Relevance {
    /// Squared L2 distance from the query embedding; lower is more relevant.
    Distance(f32),
    LexicalMatch,
}

impl Relevance {
    pub fn score(&self) -> Option<f32> {
        match self {
            Relevance::Distance(d) => Some(*d),
            Relevance::LexicalMatch => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub document: DocumentRecord,
    pub relevance: Relevance,
    pub position: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub year_min: Option<i32>,
    #[serde(default)]
    pub year_max: Option<i32>,
}

impl SearchFilters {
    pub fn source_type(&self) -> Option<&str> {
        self.source_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn has_year_bounds(&self) -> bool {
        self.year_min.is_some() || self.year_max.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.source_type().is_none() && !self.has_year_bounds()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Vector search; lexical only when it yields nothing usable.
    #[default]
    Vector,
    /// Vector results first, lexical appended for absent documents.
    Hybrid,
    Lexical,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Values below 1 are clamped to 1.
    pub top_k: i64,
    pub filters: SearchFilters,
    pub mode: SearchMode,
    /// Overrides the configured chunk/document granularity.
    pub dedup_documents: Option<bool>,
}

impl SearchOptions {
    pub fn top_k(top_k: i64) -> Self {
        Self {
            top_k,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalDiagnostics {
    pub skipped_positions: usize,
    pub missing_rows: usize,
    pub vector_results: usize,
    pub lexical_results: usize,
    pub faults: Vec<RetrievalFault>,
}

impl RetrievalDiagnostics {
    pub fn strategy(&self) -> &'static str {
        match (self.vector_results > 0, self.lexical_results > 0) {
            (true, true) => "hybrid",
            (true, false) => "vector",
            (false, true) => "lexical",
            (false, false) => "none",
        }
    }

    pub fn store_unavailable(&self) -> bool {
        self.faults
            .iter()
            .any(|f| matches!(f, RetrievalFault::StoreUnavailable(_)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub results: Vec<RetrievalResult>,
    pub diagnostics: RetrievalDiagnostics,
}

pub struct HybridRetriever {
    index: Option<Arc<IndexBundle>>,
    index_unavailable: Option<String>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    store: Option<Arc<dyn DocumentStore>>,
    annotator: Arc<dyn TextAnnotator>,
    config: RetrievalSettings,
}

impl HybridRetriever {
    pub fn new(
        store: Option<Arc<dyn DocumentStore>>,
        annotator: Arc<dyn TextAnnotator>,
        config: RetrievalSettings,
    ) -> Self {
        Self {
            index: None,
            index_unavailable: Some("no vector index loaded".to_string()),
            embedder: None,
            store,
            annotator,
            config,
        }
    }

    pub fn with_index(mut self, index: Result<Arc<IndexBundle>, String>) -> Self {
        match index {
            Ok(bundle) => {
                self.index = Some(bundle);
                self.index_unavailable = None;
            }
            Err(reason) => {
                self.index = None;
                self.index_unavailable = Some(reason);
            }
        }
        self
    }

    pub fn with_embedder(mut self, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn index_loaded(&self) -> bool {
        self.index.is_some()
    }

    pub fn embedder_configured(&self) -> bool {
        self.embedder.is_some()
    }

    pub fn index_dimension(&self) -> Option<usize> {
        self.index.as_ref().map(|b| b.dimension())
    }

    pub fn index_vectors(&self) -> usize {
        self.index.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    pub fn store(&self) -> Option<&Arc<dyn DocumentStore>> {
        self.store.as_ref()
    }

    pub fn annotator(&self) -> &Arc<dyn TextAnnotator> {
        &self.annotator
    }

    pub fn config(&self) -> &RetrievalSettings {
        &self.config
    }

    pub fn clamp_top_k(&self, requested: i64) -> usize {
        let max = self.config.max_top_k.max(1);
        usize::try_from(requested.max(1)).unwrap_or(max).min(max)
    }

    /// Never fails: every fault degrades to fewer results plus a diagnostic.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> RetrievalOutcome {
        let mut outcome = RetrievalOutcome::default();
        let query = query.trim();
        if query.is_empty() {
            outcome.diagnostics.faults.push(RetrievalFault::MalformedQuery);
            return outcome;
        }

        let Some(store) = self.store.as_ref() else {
            outcome
                .diagnostics
                .faults
                .push(RetrievalFault::StoreUnavailable(
                    "metadata store not loaded".to_string(),
                ));
            return outcome;
        };

        let top_k = self.clamp_top_k(options.top_k);
        let dedup = options.mode == SearchMode::Hybrid
            || options.dedup_documents.unwrap_or(self.config.dedup_documents);
        let candidate_k = if dedup || !options.filters.is_empty() {
            top_k.saturating_mul(self.config.candidate_multiplier.max(1))
        } else {
            top_k
        };
        let diagnostics = &mut outcome.diagnostics;

        let mut results = Vec::new();
        if options.mode != SearchMode::Lexical {
            results = self
                .vector_search(query, candidate_k, store.as_ref(), diagnostics)
                .await;
            if dedup {
                dedup_by_document(&mut results);
            }
        }
        let vector_usable = results.len();

        let run_lexical = match options.mode {
            SearchMode::Lexical | SearchMode::Hybrid => true,
            SearchMode::Vector => vector_usable == 0,
        };
        if run_lexical {
            let limit = candidate_k.min(self.config.lexical_limit.max(top_k));
            let lexical = self
                .lexical_search(query, limit, store.as_ref(), diagnostics)
                .await;
            let mut seen: HashSet<String> =
                results.iter().map(|r| r.document.id.clone()).collect();
            for result in lexical {
                if seen.insert(result.document.id.clone()) {
                    results.push(result);
                }
            }
        }

        let mut results = self.apply_filters(results, &options.filters);
        results.truncate(top_k);

        diagnostics.vector_results = results
            .iter()
            .filter(|r| matches!(r.relevance, Relevance::Distance(_)))
            .count();
        diagnostics.lexical_results = results.len() - diagnostics.vector_results;
        outcome.results = results;
        outcome
    }

    async fn vector_search(
        &self,
        query: &str,
        candidate_k: usize,
        store: &dyn DocumentStore,
        diagnostics: &mut RetrievalDiagnostics,
    ) -> Vec<RetrievalResult> {
        let Some(bundle) = self.index.as_ref() else {
            let reason = self
                .index_unavailable
                .clone()
                .unwrap_or_else(|| "no vector index loaded".to_string());
            diagnostics
                .faults
                .push(RetrievalFault::IndexUnavailable(reason));
            return Vec::new();
        };
        let Some(embedder) = self.embedder.as_ref() else {
            diagnostics.faults.push(RetrievalFault::ProviderFailure(
                ProviderError::NotConfigured.to_string(),
            ));
            return Vec::new();
        };

        let vector = match embedder.embed(query).await {
            Ok(vector) => vector,
            Err(err) => {
                tracing::warn!("Embedding failed, using lexical search: {}", err);
                diagnostics
                    .faults
                    .push(RetrievalFault::ProviderFailure(err.to_string()));
                return Vec::new();
            }
        };

        let neighbors = match bundle.index().search(&vector, candidate_k) {
            Ok(neighbors) => neighbors,
            Err(IndexError::DimensionMismatch { expected, actual }) => {
                let err = ProviderError::DimensionMismatch { expected, actual };
                tracing::warn!("{}", err);
                diagnostics
                    .faults
                    .push(RetrievalFault::ProviderFailure(err.to_string()));
                return Vec::new();
            }
            Err(err) => {
                diagnostics
                    .faults
                    .push(RetrievalFault::IndexUnavailable(err.to_string()));
                return Vec::new();
            }
        };

        let mut resolved = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            match bundle.mapping().resolve(neighbor.position) {
                Some(id) => resolved.push((neighbor, id.to_string())),
                None => {
                    tracing::debug!(position = neighbor.position, "Unmapped index position");
                    diagnostics.skipped_positions += 1;
                }
            }
        }

        let mut ids: Vec<String> = resolved.iter().map(|(_, id)| id.clone()).collect();
        ids.sort();
        ids.dedup();
        let rows = match store.get_documents(&ids).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!("Metadata lookup failed: {}", err);
                diagnostics
                    .faults
                    .push(RetrievalFault::StoreUnavailable(err.to_string()));
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(resolved.len());
        for (neighbor, id) in resolved {
            match rows.get(&id) {
                Some(document) => results.push(RetrievalResult {
                    document: document.clone(),
                    relevance: Relevance::Distance(neighbor.distance),
                    position: Some(neighbor.position),
                }),
                None => {
                    tracing::debug!(position = neighbor.position, document_id = %id, "Index points at a missing row");
                    diagnostics.missing_rows += 1;
                }
            }
        }

        let skipped = diagnostics.skipped_positions + diagnostics.missing_rows;
        if skipped > 0 {
            diagnostics
                .faults
                .push(RetrievalFault::InconsistentIndex { skipped });
        }
        results
    }

    async fn lexical_search(
        &self,
        query: &str,
        limit: usize,
        store: &dyn DocumentStore,
        diagnostics: &mut RetrievalDiagnostics,
    ) -> Vec<RetrievalResult> {
        let terms = lexical_terms(query, self.config.min_term_length);
        if terms.is_empty() {
            return Vec::new();
        }

        match store.lexical_search(&terms, limit).await {
            Ok(documents) => documents
                .into_iter()
                .map(|document| RetrievalResult {
                    document,
                    relevance: Relevance::LexicalMatch,
                    position: None,
                })
                .collect(),
            Err(err) => {
                tracing::warn!("Lexical search failed: {}", err);
                diagnostics
                    .faults
                    .push(RetrievalFault::StoreUnavailable(err.to_string()));
                Vec::new()
            }
        }
    }

    /// Narrows an already-ranked list; order is preserved.
    pub fn apply_filters(
        &self,
        results: Vec<RetrievalResult>,
        filters: &SearchFilters,
    ) -> Vec<RetrievalResult> {
        if filters.is_empty() {
            return results;
        }
        results
            .into_iter()
            .filter(|r| self.passes(&r.document, filters))
            .collect()
    }

    /// First in-range year mentioned in the text, else the record's own year.
    pub fn resolve_year(&self, document: &DocumentRecord) -> Option<i32> {
        self.annotator
            .first_year(&document.searchable_text())
            .or(document.year)
    }

    fn passes(&self, document: &DocumentRecord, filters: &SearchFilters) -> bool {
        if let Some(source_type) = filters.source_type() {
            if !document.doc_type.eq_ignore_ascii_case(source_type) {
                return false;
            }
        }
        if !filters.has_year_bounds() {
            return true;
        }
        let Some(year) = self.resolve_year(document) else {
            return false;
        };
        filters.year_min.map_or(true, |min| year >= min)
            && filters.year_max.map_or(true, |max| year <= max)
    }
}

/// Whitespace-delimited terms, edge punctuation trimmed, short terms dropped.
pub fn lexical_terms(query: &str, min_len: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .split_whitespace()
        .map(|raw| {
            raw.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|term| term.chars().count() >= min_len)
        .filter(|term| seen.insert(term.clone()))
        .collect()
}

fn dedup_by_document(results: &mut Vec<RetrievalResult>) {
    let mut seen = HashSet::new();
    results.retain(|r| seen.insert(r.document.id.clone()));
}
