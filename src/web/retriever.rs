use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::{timeout_at, Instant};

use super::{PageFetcher, SearchHit, WebResult, WebSearchProvider};
use crate::core::config::settings::WebSettings;
use crate::rag::context_builder::excerpt;

const PLACEHOLDER_SNIPPET: &str = "Content could not be retrieved.";

/// Searches the web and summarizes the top pages under a single deadline.
///
/// Never fails: a search error yields no results, a failed or late fetch
/// yields a placeholder built from the search hit.
pub struct WebFallbackRetriever {
    search: Arc<dyn WebSearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    timeout: Duration,
    max_results: usize,
    snippet_chars: usize,
}

impl WebFallbackRetriever {
    pub fn new(
        search: Arc<dyn WebSearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        settings: &WebSettings,
    ) -> Self {
        Self {
            search,
            fetcher,
            timeout: Duration::from_secs(settings.timeout_secs.max(1)),
            max_results: settings.max_results.max(1),
            snippet_chars: settings.snippet_chars.max(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.search.name()
    }

    pub async fn search_web(&self, query: &str, limit: usize) -> Vec<WebResult> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let limit = limit.clamp(1, self.max_results);
        let deadline = Instant::now() + self.timeout;

        let hits = match timeout_at(deadline, self.search.search(query, limit)).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(err)) => {
                tracing::warn!("Web search via {} failed: {}", self.search.name(), err);
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!("Web search via {} timed out", self.search.name());
                return Vec::new();
            }
        };

        let hits: Vec<SearchHit> = hits.into_iter().take(limit).collect();
        if hits.is_empty() {
            return Vec::new();
        }

        let fetches = hits.iter().map(|hit| self.summarize(hit, deadline));
        let results = join_all(fetches).await;
        tracing::debug!(
            "Web fallback produced {} results ({} fetched)",
            results.len(),
            results.iter().filter(|r| r.fetched).count()
        );
        results
    }

    async fn summarize(&self, hit: &SearchHit, deadline: Instant) -> WebResult {
        if Instant::now() >= deadline {
            return self.placeholder(hit);
        }
        match timeout_at(deadline, self.fetcher.fetch(&hit.url)).await {
            Ok(Ok(page)) if !page.text.is_empty() => WebResult {
                title: page
                    .title
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| hit.title.clone()),
                url: hit.url.clone(),
                snippet: excerpt(&page.text, self.snippet_chars),
                fetched: true,
            },
            Ok(Ok(_)) => self.placeholder(hit),
            Ok(Err(err)) => {
                tracing::debug!("Fetching {} failed: {}", hit.url, err);
                self.placeholder(hit)
            }
            Err(_) => {
                tracing::debug!("Fetching {} hit the web deadline", hit.url);
                self.placeholder(hit)
            }
        }
    }

    fn placeholder(&self, hit: &SearchHit) -> WebResult {
        let snippet = if hit.snippet.trim().is_empty() {
            PLACEHOLDER_SNIPPET.to_string()
        } else {
            excerpt(&hit.snippet, self.snippet_chars)
        };
        WebResult {
            title: hit.title.clone(),
            url: hit.url.clone(),
            snippet,
            fetched: false,
        }
    }
}
