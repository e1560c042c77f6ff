use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::{EmbeddingProvider, LlmProvider, ProviderError};
use super::types::ChatRequest;
use crate::core::config::settings::{EmbeddingSettings, LlmSettings, OPENAI_BASE_URL};

/// Client for any OpenAI-compatible `/v1` endpoint (OpenAI, LM Studio, vLLM, ...).
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: normalize_base_url(base_url),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            client,
        })
    }

    /// `None` when neither a base URL nor an API key is configured.
    pub fn from_llm_settings(settings: &LlmSettings) -> Result<Option<Self>, ProviderError> {
        if !settings.is_configured() {
            return Ok(None);
        }
        Self::new(
            settings.base_url.as_deref().unwrap_or(OPENAI_BASE_URL),
            settings.api_key.clone(),
            settings.model.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
        .map(Some)
    }

    pub fn from_embedding_settings(
        settings: &EmbeddingSettings,
    ) -> Result<Option<Self>, ProviderError> {
        if !settings.is_configured() {
            return Ok(None);
        }
        Self::new(
            settings.base_url.as_deref().unwrap_or(OPENAI_BASE_URL),
            settings.api_key.clone(),
            settings.model.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
        .map(Some)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self.client.post(format!("{}/v1/{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn chat_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": stream,
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(m) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(m));
            }
        }
        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai_compatible"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError> {
        let res = self
            .post("chat/completions")
            .json(&self.chat_body(&request, false))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let text = res.text().await.unwrap_or_default();
            return Err(ProviderError::http(status, &text));
        }

        let payload: Value = res.json().await?;
        parse_chat_content(&payload)
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError> {
        let res = self
            .post("chat/completions")
            .json(&self.chat_body(&request, true))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let text = res.text().await.unwrap_or_default();
            return Err(ProviderError::http(status, &text));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            let mut lines = SseLineBuffer::default();
            while let Some(item) = stream.next().await {
                let bytes = match item {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::from(e))).await;
                        return;
                    }
                };
                for line in lines.push(&bytes) {
                    match parse_sse_line(&line) {
                        SseEvent::Done => return,
                        SseEvent::Delta(content) => {
                            if tx.send(Ok(content)).await.is_err() {
                                return;
                            }
                        }
                        SseEvent::Skip => {}
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai_compatible"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = json!({
            "model": self.model,
            "input": [text],
        });

        let res = self.post("embeddings").json(&body).send().await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let text = res.text().await.unwrap_or_default();
            return Err(ProviderError::http(status, &text));
        }

        let payload: Value = res.json().await?;
        parse_first_embedding(&payload)
    }
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    trimmed.strip_suffix("/v1").unwrap_or(trimmed).to_string()
}

fn parse_chat_content(payload: &Value) -> Result<String, ProviderError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ProviderError::Decode("missing choices[0].message.content".to_string()))
}

fn parse_first_embedding(payload: &Value) -> Result<Vec<f32>, ProviderError> {
    let values = payload["data"][0]["embedding"]
        .as_array()
        .ok_or_else(|| ProviderError::Decode("missing data[0].embedding".to_string()))?;
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| ProviderError::Decode("non-numeric embedding value".to_string()))
        })
        .collect()
}

#[derive(Debug, PartialEq)]
pub(crate) enum SseEvent {
    Delta(String),
    Done,
    Skip,
}

pub(crate) fn parse_sse_line(line: &str) -> SseEvent {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseEvent::Done;
    }
    match serde_json::from_str::<Value>(data) {
        Ok(json) => match json["choices"][0]["delta"]["content"].as_str() {
            Some(content) if !content.is_empty() => SseEvent::Delta(content.to_string()),
            _ => SseEvent::Skip,
        },
        Err(_) => SseEvent::Skip,
    }
}

/// Reassembles lines that the transport split across byte chunks.
#[derive(Default)]
pub(crate) struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let text = String::from_utf8_lossy(&line).trim_end().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    #[test]
    fn base_url_drops_trailing_version_segment() {
        assert_eq!(normalize_base_url("http://localhost:1234/v1/"), "http://localhost:1234");
        assert_eq!(normalize_base_url("https://api.openai.com"), "https://api.openai.com");
    }

    #[test]
    fn sse_lines_split_across_chunks_are_reassembled() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"data: {\"choices\":[{\"delta\":{\"con").is_empty());
        let lines = buffer.push(b"tent\":\"Zheng \"}}]}\n\ndata: [DONE]\n");

        assert_eq!(lines.len(), 2);
        assert_eq!(parse_sse_line(&lines[0]), SseEvent::Delta("Zheng ".to_string()));
        assert_eq!(parse_sse_line(&lines[1]), SseEvent::Done);
    }

    #[test]
    fn role_only_and_comment_lines_are_skipped() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseEvent::Skip
        );
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Skip);
    }

    #[test]
    fn chat_body_carries_sampling_options() {
        let provider = OpenAiCompatibleProvider::new(
            "http://localhost:1",
            None,
            "gpt-4o-mini",
            Duration::from_secs(1),
        )
        .unwrap();
        let request = ChatRequest::new(vec![ChatMessage::user("hi")]).with_sampling(0.7, 500);

        let body = provider.chat_body(&request, true);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn embedding_payload_must_be_numeric() {
        let ok = json!({ "data": [{ "embedding": [0.5, 1.0] }] });
        assert_eq!(parse_first_embedding(&ok).unwrap(), vec![0.5, 1.0]);

        let bad = json!({ "data": [{ "embedding": ["x"] }] });
        assert!(matches!(parse_first_embedding(&bad), Err(ProviderError::Decode(_))));
    }

    #[test]
    fn unconfigured_settings_build_no_client() {
        let settings = LlmSettings::default();
        assert!(OpenAiCompatibleProvider::from_llm_settings(&settings)
            .unwrap()
            .is_none());
    }
}
