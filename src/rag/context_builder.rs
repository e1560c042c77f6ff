//! Context Assembler.
//!
//! Renders retrieved documents (and web summaries, when the web fallback ran)
//! into one bounded text block with `[Document N]` provenance labels.

use serde::Serialize;

use super::retriever::RetrievalResult;
use crate::core::config::settings::ContextSettings;
use crate::store::DocumentRecord;
use crate::web::WebResult;

/// `[Document N]` numbering in the context matches `cited` order.
#[derive(Debug, Clone, PartialEq)]
pub enum AssembledContext {
    /// Nothing to ground on; callers must not treat this as an empty success.
    NoDocuments,
    Built {
        text: String,
        cited: Vec<DocumentRecord>,
        web: Vec<WebResult>,
    },
}

impl AssembledContext {
    pub fn text(&self) -> Option<&str> {
        match self {
            AssembledContext::NoDocuments => None,
            AssembledContext::Built { text, .. } => Some(text),
        }
    }

    pub fn cited(&self) -> &[DocumentRecord] {
        match self {
            AssembledContext::NoDocuments => &[],
            AssembledContext::Built { cited, .. } => cited,
        }
    }

    pub fn web(&self) -> &[WebResult] {
        match self {
            AssembledContext::NoDocuments => &[],
            AssembledContext::Built { web, .. } => web,
        }
    }

    /// Documents plus web results that made it into the context.
    pub fn grounding_count(&self) -> usize {
        self.cited().len() + self.web().len()
    }
}

/// Citation shape returned alongside answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCitation {
    pub id: String,
    pub title: String,
    pub author: String,
    pub source_type: String,
    pub url: Option<String>,
}

impl From<&DocumentRecord> for SourceCitation {
    fn from(doc: &DocumentRecord) -> Self {
        Self {
            id: doc.id.clone(),
            title: doc.title.clone(),
            author: doc.author.clone(),
            source_type: doc.doc_type.clone(),
            url: doc.url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    max_documents: usize,
    max_chars_per_document: usize,
}

impl ContextAssembler {
    pub fn new(max_documents: usize, max_chars_per_document: usize) -> Self {
        Self {
            max_documents: max_documents.max(1),
            max_chars_per_document: max_chars_per_document.max(1),
        }
    }

    pub fn from_settings(settings: &ContextSettings) -> Self {
        Self::new(settings.max_documents, settings.max_chars_per_document)
    }

    pub fn build(&self, results: &[RetrievalResult], web: &[WebResult]) -> AssembledContext {
        if results.is_empty() && web.is_empty() {
            return AssembledContext::NoDocuments;
        }

        let cited: Vec<DocumentRecord> = results
            .iter()
            .take(self.max_documents)
            .map(|r| r.document.clone())
            .collect();
        let web: Vec<WebResult> = web.iter().take(self.max_documents).cloned().collect();

        let mut text = String::new();
        if !cited.is_empty() {
            text.push_str("Relevant documents from the knowledge base:\n\n");
            for (i, doc) in cited.iter().enumerate() {
                self.render_document(&mut text, i + 1, doc);
            }
        }
        if !web.is_empty() {
            text.push_str("Web search results:\n\n");
            for (i, result) in web.iter().enumerate() {
                text.push_str(&format!("[Web Result {}] {}\n", i + 1, result.title));
                text.push_str(&format!(
                    "Summary: {}\n\n",
                    truncate_chars(&result.snippet, self.max_chars_per_document)
                ));
            }
        }

        AssembledContext::Built { text, cited, web }
    }

    fn render_document(&self, out: &mut String, number: usize, doc: &DocumentRecord) {
        out.push_str(&format!("[Document {}] {}", number, doc.title));
        if let Some(year) = doc.year {
            out.push_str(&format!(" ({})", year));
        }
        if doc.has_known_author() {
            out.push_str(&format!(" by {}", doc.author));
        }
        out.push('\n');
        out.push_str(&format!("Type: {}\n", doc.doc_type));
        out.push_str(&format!(
            "Content: {}\n",
            truncate_chars(doc.body(), self.max_chars_per_document)
        ));
        if !doc.tags.is_empty() {
            let tags: Vec<&str> = doc.tags.iter().map(String::as_str).collect();
            out.push_str(&format!("Tags: {}\n", tags.join(", ")));
        }
        out.push('\n');
    }
}

/// Hard cut at `max` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Trimmed text cut to `max` characters, with `...` appended when something was dropped.
pub fn excerpt(text: &str, max: usize) -> String {
    let text = text.trim();
    let cut = truncate_chars(text, max);
    if cut.len() < text.len() {
        format!("{}...", cut)
    } else {
        cut.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::retriever::Relevance;

    fn result(doc: DocumentRecord) -> RetrievalResult {
        RetrievalResult {
            document: doc,
            relevance: Relevance::LexicalMatch,
            position: None,
        }
    }

    #[test]
    fn empty_input_signals_no_documents() {
        let assembler = ContextAssembler::new(5, 800);
        assert_eq!(assembler.build(&[], &[]), AssembledContext::NoDocuments);
    }

    #[test]
    fn renders_labels_and_truncates_excerpts() {
        let mut first = DocumentRecord::new("a", "Zheng He");
        first.year = Some(1405);
        first.author = "Ma Huan".to_string();
        first.doc_type = "book".to_string();
        first.content = "ééééééé".to_string();
        first.tags = ["ming".to_string()].into_iter().collect();
        let second = DocumentRecord::new("b", "Anonymous Chart");
        let third = DocumentRecord::new("c", "Dropped");

        let context = ContextAssembler::new(2, 3).build(
            &[result(first), result(second), result(third)],
            &[],
        );

        let AssembledContext::Built { text, cited, .. } = context else {
            panic!("expected built context");
        };
        assert_eq!(cited.len(), 2);
        assert!(text.contains("[Document 1] Zheng He (1405) by Ma Huan\nType: book\nContent: ééé\nTags: ming\n"));
        assert!(text.contains("[Document 2] Anonymous Chart\nType: document\n"));
        assert!(!text.contains("Dropped"));
    }

    #[test]
    fn web_results_are_labelled_separately() {
        let web = vec![WebResult {
            title: "Treasure fleet".to_string(),
            url: "https://example.org".to_string(),
            snippet: "Large ships".to_string(),
            fetched: true,
        }];
        let context = ContextAssembler::new(5, 800).build(&[], &web);

        assert_eq!(context.grounding_count(), 1);
        let text = context.text().unwrap();
        assert!(text.starts_with("Web search results:"));
        assert!(text.contains("[Web Result 1] Treasure fleet\nSummary: Large ships"));
        assert!(!text.contains("https://"));
    }

    #[test]
    fn truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
        assert_eq!(excerpt("  short  ", 10), "short");
        assert_eq!(excerpt("Treasure fleet", 8), "Treasure...");
    }
}
