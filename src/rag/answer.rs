//! Answer Generator: grounded model call with deterministic fallback.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::context_builder::{excerpt, AssembledContext, SourceCitation};
use super::scrub::CitationScrubber;
use crate::core::config::defaults::{compose_system_prompt, NO_DOCUMENTS_MESSAGE};
use crate::core::config::settings::LlmSettings;
use crate::llm::{ChatRequest, LlmProvider, ProviderError};

const FALLBACK_EXCERPT_CHARS: usize = 300;
const FALLBACK_CONFIDENCE: f32 = 0.5;

/// Events delivered to a streaming sink, in order; `Done` is always last.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerEvent {
    Chunk(String),
    /// Model failed; carries the synthesized answer (after any chunks already sent).
    Fallback(String),
    Done,
}

pub enum AnswerMode {
    Blocking,
    Streaming(mpsc::Sender<AnswerEvent>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    Model,
    Fallback,
    NoContext,
    /// Streaming consumer went away before completion.
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub confidence: f32,
    pub generation: Generation,
}

pub struct AnswerGenerator {
    llm: Option<Arc<dyn LlmProvider>>,
    scrubber: Arc<CitationScrubber>,
    persona: Option<String>,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
    max_sources: usize,
}

impl AnswerGenerator {
    pub fn new(
        llm: Option<Arc<dyn LlmProvider>>,
        scrubber: Arc<CitationScrubber>,
        settings: &LlmSettings,
    ) -> Self {
        Self {
            llm,
            scrubber,
            persona: settings.system_prompt.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout: Duration::from_secs(settings.timeout_secs.max(1)),
            max_sources: settings.max_sources.max(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_model(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn answer(
        &self,
        question: &str,
        context: &AssembledContext,
        use_external_provider: bool,
        mode: AnswerMode,
    ) -> AnswerResult {
        let Some(context_text) = context.text() else {
            let result = AnswerResult {
                answer: NO_DOCUMENTS_MESSAGE.to_string(),
                sources: Vec::new(),
                confidence: 0.0,
                generation: Generation::NoContext,
            };
            if let AnswerMode::Streaming(sink) = mode {
                let _ = sink.send(AnswerEvent::Chunk(result.answer.clone())).await;
                let _ = sink.send(AnswerEvent::Done).await;
            }
            return result;
        };

        let sources: Vec<SourceCitation> = context
            .cited()
            .iter()
            .take(self.max_sources)
            .map(SourceCitation::from)
            .collect();
        let fallback = synthesize_fallback(question, context);
        let success_confidence = (0.5 + context.grounding_count() as f32 / 10.0).min(0.9);

        let llm = match (&self.llm, use_external_provider) {
            (Some(llm), true) => Some(llm),
            _ => None,
        };
        let request = ChatRequest::grounded(
            compose_system_prompt(self.persona.as_deref(), context_text),
            question,
        )
        .with_sampling(self.temperature, self.max_tokens);

        match mode {
            AnswerMode::Blocking => {
                let generated = match llm {
                    Some(llm) => self.generate_blocking(llm.as_ref(), request).await,
                    None => None,
                };
                match generated {
                    Some(answer) => AnswerResult {
                        answer,
                        sources,
                        confidence: success_confidence,
                        generation: Generation::Model,
                    },
                    None => AnswerResult {
                        answer: fallback,
                        sources,
                        confidence: FALLBACK_CONFIDENCE,
                        generation: Generation::Fallback,
                    },
                }
            }
            AnswerMode::Streaming(sink) => {
                let (answer, generation) = match llm {
                    Some(llm) => {
                        self.generate_streaming(llm.as_ref(), request, &sink, &fallback)
                            .await
                    }
                    None => emit_fallback(&sink, String::new(), &fallback).await,
                };
                if generation != Generation::Cancelled {
                    let _ = sink.send(AnswerEvent::Done).await;
                }
                let confidence = match generation {
                    Generation::Model => success_confidence,
                    _ => FALLBACK_CONFIDENCE,
                };
                AnswerResult {
                    answer,
                    sources,
                    confidence,
                    generation,
                }
            }
        }
    }

    async fn generate_blocking(
        &self,
        llm: &dyn LlmProvider,
        request: ChatRequest,
    ) -> Option<String> {
        let outcome = match timeout(self.timeout, llm.chat(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::Timeout),
        };
        match outcome {
            Ok(text) => {
                let cleaned = self.scrubber.scrub(&text);
                if cleaned.is_empty() {
                    tracing::warn!("Model returned an empty answer, using fallback");
                    None
                } else {
                    Some(cleaned)
                }
            }
            Err(err) => {
                tracing::warn!("Language model failed, using fallback: {}", err);
                None
            }
        }
    }

    /// Returns everything emitted to the sink and how it ended.
    async fn generate_streaming(
        &self,
        llm: &dyn LlmProvider,
        request: ChatRequest,
        sink: &mpsc::Sender<AnswerEvent>,
        fallback: &str,
    ) -> (String, Generation) {
        let mut rx = match timeout(self.timeout, llm.stream_chat(request)).await {
            Ok(Ok(rx)) => rx,
            Ok(Err(err)) => {
                tracing::warn!("Language model stream failed to start: {}", err);
                return emit_fallback(sink, String::new(), fallback).await;
            }
            Err(_) => {
                tracing::warn!("Language model stream timed out before starting");
                return emit_fallback(sink, String::new(), fallback).await;
            }
        };

        let mut emitted = String::new();
        let mut buffer = self.scrubber.chunk_buffer();
        loop {
            match timeout(self.timeout, rx.recv()).await {
                Ok(Some(Ok(chunk))) => {
                    let clean = buffer.push(&chunk);
                    if !send_chunk(sink, &mut emitted, clean).await {
                        tracing::debug!("Stream consumer disconnected, cancelling provider call");
                        drop(rx);
                        return (emitted, Generation::Cancelled);
                    }
                }
                Ok(Some(Err(err))) => {
                    tracing::warn!("Language model stream failed mid-answer: {}", err);
                    if !send_chunk(sink, &mut emitted, buffer.finish()).await {
                        return (emitted, Generation::Cancelled);
                    }
                    return emit_fallback(sink, emitted, fallback).await;
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("Language model stream stalled, using fallback");
                    if !send_chunk(sink, &mut emitted, buffer.finish()).await {
                        return (emitted, Generation::Cancelled);
                    }
                    return emit_fallback(sink, emitted, fallback).await;
                }
            }
        }

        if !send_chunk(sink, &mut emitted, buffer.finish()).await {
            return (emitted, Generation::Cancelled);
        }
        if emitted.trim().is_empty() {
            return emit_fallback(sink, emitted, fallback).await;
        }
        (emitted, Generation::Model)
    }
}

/// Forwards scrubbed text; `false` once the consumer is gone.
async fn send_chunk(sink: &mpsc::Sender<AnswerEvent>, emitted: &mut String, clean: String) -> bool {
    if clean.is_empty() {
        return true;
    }
    if sink.send(AnswerEvent::Chunk(clean.clone())).await.is_err() {
        return false;
    }
    emitted.push_str(&clean);
    true
}

/// Sends the fallback after whatever was already streamed; nothing is retracted.
async fn emit_fallback(
    sink: &mpsc::Sender<AnswerEvent>,
    mut emitted: String,
    fallback: &str,
) -> (String, Generation) {
    let text = if emitted.is_empty() {
        fallback.to_string()
    } else {
        format!("\n\n{}", fallback)
    };
    if sink.send(AnswerEvent::Fallback(text.clone())).await.is_err() {
        return (emitted, Generation::Cancelled);
    }
    emitted.push_str(&text);
    (emitted, Generation::Fallback)
}

/// Deterministic answer built from retrieved material alone.
pub fn synthesize_fallback(question: &str, context: &AssembledContext) -> String {
    if let Some(doc) = context.cited().first() {
        let author = if doc.has_known_author() {
            doc.author.as_str()
        } else {
            "an unknown author"
        };
        return format!(
            "I found {} relevant documents about '{}'. The most relevant document is: '{}' by {}.\n\nExcerpt: {}",
            context.cited().len(),
            question.trim(),
            doc.title,
            author,
            excerpt(doc.body(), FALLBACK_EXCERPT_CHARS),
        );
    }
    if let Some(web) = context.web().first() {
        return format!(
            "I found {} relevant web results about '{}'. The most relevant result is: '{}'.\n\nExcerpt: {}",
            context.web().len(),
            question.trim(),
            web.title,
            excerpt(&web.snippet, FALLBACK_EXCERPT_CHARS),
        );
    }
    NO_DOCUMENTS_MESSAGE.to_string()
}
