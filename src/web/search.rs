use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{SearchHit, WebError, WebSearchProvider};
use crate::core::config::settings::WebSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Backend {
    DuckDuckGo,
    Google { api_key: String, engine_id: String },
    Brave { api_key: String },
    Bing { api_key: String },
}

/// Search backend chosen from `web.provider`; keyless choices fall back to DuckDuckGo.
pub struct ConfiguredWebSearch {
    backend: Backend,
    client: Client,
}

impl ConfiguredWebSearch {
    pub fn from_settings(settings: &WebSettings) -> Result<Self, WebError> {
        let key = |k: &Option<String>| k.clone().filter(|v| !v.trim().is_empty());
        let backend = match settings.provider.to_lowercase().as_str() {
            "google" => match (
                key(&settings.google_search_api_key),
                key(&settings.google_search_engine_id),
            ) {
                (Some(api_key), Some(engine_id)) => Backend::Google { api_key, engine_id },
                _ => Backend::DuckDuckGo,
            },
            "brave" => key(&settings.brave_search_api_key)
                .map(|api_key| Backend::Brave { api_key })
                .unwrap_or(Backend::DuckDuckGo),
            "bing" => key(&settings.bing_search_api_key)
                .map(|api_key| Backend::Bing { api_key })
                .unwrap_or(Backend::DuckDuckGo),
            _ => Backend::DuckDuckGo,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| WebError::Transport(e.to_string()))?;

        Ok(Self { backend, client })
    }

    async fn get_json(&self, request: reqwest::RequestBuilder) -> Result<Value, WebError> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(WebError::Http(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    async fn google(
        &self,
        query: &str,
        api_key: &str,
        engine_id: &str,
    ) -> Result<Vec<SearchHit>, WebError> {
        let url = format!(
            "https://www.googleapis.com/customsearch/v1?key={}&cx={}&q={}",
            api_key,
            engine_id,
            urlencoding::encode(query)
        );
        let payload = self.get_json(self.client.get(url)).await?;
        Ok(collect_hits(payload.get("items"), "title", "link", "snippet"))
    }

    async fn brave(&self, query: &str, api_key: &str) -> Result<Vec<SearchHit>, WebError> {
        let url = format!(
            "https://api.search.brave.com/res/v1/web/search?q={}",
            urlencoding::encode(query)
        );
        let payload = self
            .get_json(
                self.client
                    .get(url)
                    .header("X-Subscription-Token", api_key)
                    .header("Accept", "application/json"),
            )
            .await?;
        Ok(collect_hits(
            payload.get("web").and_then(|w| w.get("results")),
            "title",
            "url",
            "description",
        ))
    }

    async fn bing(&self, query: &str, api_key: &str) -> Result<Vec<SearchHit>, WebError> {
        let url = format!(
            "https://api.bing.microsoft.com/v7.0/search?q={}",
            urlencoding::encode(query)
        );
        let payload = self
            .get_json(
                self.client
                    .get(url)
                    .header("Ocp-Apim-Subscription-Key", api_key),
            )
            .await?;
        Ok(collect_hits(
            payload.get("webPages").and_then(|w| w.get("value")),
            "name",
            "url",
            "snippet",
        ))
    }

    async fn duckduckgo(&self, query: &str) -> Result<Vec<SearchHit>, WebError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
            urlencoding::encode(query)
        );
        let payload = self.get_json(self.client.get(url)).await?;
        Ok(parse_duckduckgo(&payload))
    }
}

#[async_trait]
impl WebSearchProvider for ConfiguredWebSearch {
    fn name(&self) -> &str {
        match self.backend {
            Backend::DuckDuckGo => "duckduckgo",
            Backend::Google { .. } => "google",
            Backend::Brave { .. } => "brave",
            Backend::Bing { .. } => "bing",
        }
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, WebError> {
        let mut hits = match &self.backend {
            Backend::Google { api_key, engine_id } => {
                match self.google(query, api_key, engine_id).await {
                    Ok(hits) if !hits.is_empty() => hits,
                    Ok(_) => self.duckduckgo(query).await?,
                    Err(err) => {
                        tracing::warn!("Google search failed, trying DuckDuckGo: {}", err);
                        self.duckduckgo(query).await?
                    }
                }
            }
            Backend::Brave { api_key } => self.brave(query, api_key).await?,
            Backend::Bing { api_key } => self.bing(query, api_key).await?,
            Backend::DuckDuckGo => self.duckduckgo(query).await?,
        };
        hits.truncate(limit);
        Ok(hits)
    }
}

fn collect_hits(items: Option<&Value>, title_key: &str, url_key: &str, snippet_key: &str) -> Vec<SearchHit> {
    let Some(items) = items.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let title = item.get(title_key)?.as_str()?.trim();
            let url = item.get(url_key)?.as_str()?.trim();
            if title.is_empty() || url.is_empty() {
                return None;
            }
            let snippet = item
                .get(snippet_key)
                .and_then(Value::as_str)
                .unwrap_or_default();
            Some(SearchHit {
                title: title.to_string(),
                url: url.to_string(),
                snippet: snippet.to_string(),
            })
        })
        .collect()
}

fn parse_duckduckgo(payload: &Value) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    let abstract_text = payload
        .get("AbstractText")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let abstract_url = payload
        .get("AbstractURL")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        let heading = payload
            .get("Heading")
            .and_then(Value::as_str)
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| topic_title(abstract_text));
        hits.push(SearchHit {
            title: heading.to_string(),
            url: abstract_url.to_string(),
            snippet: abstract_text.to_string(),
        });
    }

    for key in ["Results", "RelatedTopics"] {
        if let Some(items) = payload.get(key).and_then(Value::as_array) {
            collect_topics(items, &mut hits);
        }
    }
    hits
}

fn collect_topics(items: &[Value], hits: &mut Vec<SearchHit>) {
    for item in items {
        if let Some(nested) = item.get("Topics").and_then(Value::as_array) {
            collect_topics(nested, hits);
            continue;
        }
        let text = item.get("Text").and_then(Value::as_str).unwrap_or_default();
        let url = item.get("FirstURL").and_then(Value::as_str).unwrap_or_default();
        if text.is_empty() || url.is_empty() {
            continue;
        }
        hits.push(SearchHit {
            title: topic_title(text).to_string(),
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}

fn topic_title(text: &str) -> &str {
    text.split(" - ").next().unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyless_provider_falls_back_to_duckduckgo() {
        let settings = WebSettings {
            provider: "brave".to_string(),
            ..WebSettings::default()
        };
        let search = ConfiguredWebSearch::from_settings(&settings).unwrap();
        assert_eq!(search.name(), "duckduckgo");

        let keyed = WebSettings {
            provider: "Brave".to_string(),
            brave_search_api_key: Some("key".to_string()),
            ..WebSettings::default()
        };
        assert_eq!(ConfiguredWebSearch::from_settings(&keyed).unwrap().name(), "brave");
    }

    #[test]
    fn duckduckgo_payload_flattens_nested_topics() {
        let payload = json!({
            "Heading": "Zheng He",
            "AbstractText": "Zheng He was a Chinese mariner.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Zheng_He",
            "RelatedTopics": [
                { "Text": "Treasure voyages - Ming expeditions", "FirstURL": "https://duckduckgo.com/Treasure_voyages" },
                { "Topics": [ { "Text": "Ma Huan - chronicler", "FirstURL": "https://duckduckgo.com/Ma_Huan" } ] },
                { "Text": "", "FirstURL": "https://duckduckgo.com/empty" }
            ]
        });

        let hits = parse_duckduckgo(&payload);
        let titles: Vec<&str> = hits.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["Zheng He", "Treasure voyages", "Ma Huan"]);
    }

    #[test]
    fn collect_hits_skips_untitled_items() {
        let items = json!([
            { "name": "Ming Navy", "url": "https://example.org/navy", "snippet": "Fleet" },
            { "name": "", "url": "https://example.org/blank" }
        ]);
        let hits = collect_hits(Some(&items), "name", "url", "snippet");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snippet, "Fleet");
    }
}
