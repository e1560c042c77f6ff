use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::index::IndexBundle;
use crate::llm::{EmbeddingProvider, LlmProvider, OpenAiCompatibleProvider};
use crate::rag::{
    AnswerGenerator, CitationScrubber, ContextAssembler, HybridRetriever, RagPipeline,
    RegexEntityAnnotator, RegexYearAnnotator,
};
use crate::store::{DocumentStore, SqliteDocumentStore};
use crate::web::{ConfiguredWebSearch, HttpPageFetcher, WebFallbackRetriever};

pub mod error;

use error::InitializationError;

/// Process-wide state, built once at startup and read-only afterwards.
///
/// The index, store handle and provider clients live inside the pipeline;
/// handlers only ever borrow them.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Arc<Settings>,
    pub pipeline: Arc<RagPipeline>,
}

impl AppState {
    pub fn new(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: Settings,
        pipeline: RagPipeline,
    ) -> Arc<Self> {
        Arc::new(Self {
            paths,
            config,
            settings: Arc::new(settings),
            pipeline: Arc::new(pipeline),
        })
    }

    /// Loads configuration and artifacts, then wires the pipeline.
    ///
    /// Missing index artifacts or providers degrade the service; only the
    /// absence of every data source is fatal.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings()
            .map_err(InitializationError::Config)?;

        let store_path = paths.resolve(&settings.data.store_path);
        let store: Option<Arc<dyn DocumentStore>> =
            match SqliteDocumentStore::open_read_only(&store_path).await {
                Ok(store) => {
                    tracing::info!("Metadata store opened: {}", store_path.display());
                    Some(Arc::new(store))
                }
                Err(err) => {
                    if !settings.web.enabled {
                        return Err(InitializationError::NoDataSource(err.to_string()));
                    }
                    tracing::warn!("Metadata store unavailable, serving web results only: {}", err);
                    None
                }
            };

        let index_path = paths.resolve(&settings.data.index_path);
        let mapping_path = paths.resolve(&settings.data.mapping_path);
        let index = match IndexBundle::load(&index_path, &mapping_path) {
            Ok(bundle) => {
                tracing::info!(
                    vectors = bundle.len(),
                    dimension = bundle.dimension(),
                    "Vector index loaded"
                );
                Ok(Arc::new(bundle))
            }
            Err(err) => {
                tracing::warn!("Vector index unavailable, using lexical search only: {}", err);
                Err(err.to_string())
            }
        };

        let embedder: Option<Arc<dyn EmbeddingProvider>> =
            match OpenAiCompatibleProvider::from_embedding_settings(&settings.embedding)? {
                Some(provider) => {
                    tracing::info!("Embedding provider: {}", provider.model());
                    Some(Arc::new(provider))
                }
                None => {
                    tracing::info!("No embedding provider configured");
                    None
                }
            };
        let llm: Option<Arc<dyn LlmProvider>> =
            match OpenAiCompatibleProvider::from_llm_settings(&settings.llm)? {
                Some(provider) => {
                    tracing::info!("Language model: {}", provider.model());
                    Some(Arc::new(provider))
                }
                None => {
                    tracing::info!("No language model configured, answers use fallback synthesis");
                    None
                }
            };

        let annotator = Arc::new(RegexYearAnnotator::new(
            settings.retrieval.year_min,
            settings.retrieval.year_max,
        )?);
        let retriever = HybridRetriever::new(store, annotator, settings.retrieval.clone())
            .with_index(index)
            .with_embedder(embedder);
        let generator =
            AnswerGenerator::new(llm, Arc::new(CitationScrubber::new()?), &settings.llm);

        let web = if settings.web.enabled {
            let search = ConfiguredWebSearch::from_settings(&settings.web)?;
            let fetcher = HttpPageFetcher::new(&settings.web)?;
            let web = WebFallbackRetriever::new(Arc::new(search), Arc::new(fetcher), &settings.web);
            tracing::info!("Web fallback enabled via {}", web.provider_name());
            Some(web)
        } else {
            None
        };

        let pipeline = RagPipeline::new(
            retriever,
            ContextAssembler::from_settings(&settings.context),
            generator,
        )
        .with_web(web, settings.web.max_results)
        .with_entities(Some(Arc::new(RegexEntityAnnotator::new()?)));

        Ok(Self::new(paths, config, settings, pipeline))
    }
}
