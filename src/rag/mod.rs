//! Retrieval-augmented answering over the historical corpus.
//!
//! - `HybridRetriever`: vector search with lexical fallback and post-filters
//! - `ContextAssembler`: bounded grounding context with `[Document N]` labels
//! - `AnswerGenerator`: model call, streaming, and deterministic fallback
//! - `RagPipeline`: the operations the HTTP layer exposes
//! - `explore`: corpus timeline, entity counts and mapped places

pub mod annotate;
pub mod answer;
pub mod context_builder;
pub mod explore;
pub mod gazetteer;
pub mod pipeline;
pub mod retriever;
pub mod scrub;


pub use annotate::{
    EntityAnnotator, EntityKind, EntityMention, RegexEntityAnnotator, RegexYearAnnotator,
    TextAnnotator,
};
pub use answer::{AnswerEvent, AnswerGenerator, AnswerMode, AnswerResult, Generation};
pub use context_builder::{AssembledContext, ContextAssembler, SourceCitation};
pub use explore::{EntityReport, MapReport, Timeline};
pub use pipeline::{AskMode, AskRequest, AskResponse, RagPipeline, SearchRequest, SearchResponse};
pub use retriever::{HybridRetriever, Relevance, RetrievalResult, SearchFilters, SearchMode, SearchOptions};
pub use scrub::CitationScrubber;
