use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// One indexed unit of knowledge: a whole source or a chunk of one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    /// `None` when the store holds the zero sentinel.
    pub year: Option<i32>,
    #[serde(rename = "type")]
    pub doc_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content_preview: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub source_reference: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub word_count: u32,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: UNKNOWN_AUTHOR.to_string(),
            year: None,
            doc_type: "document".to_string(),
            description: String::new(),
            content_preview: String::new(),
            content: String::new(),
            source_reference: String::new(),
            url: None,
            word_count: 0,
            tags: BTreeSet::new(),
        }
    }

    pub fn has_known_author(&self) -> bool {
        !self.author.trim().is_empty() && self.author != UNKNOWN_AUTHOR
    }

    /// Full content when present, the stored preview otherwise.
    pub fn body(&self) -> &str {
        if self.content.trim().is_empty() {
            &self.content_preview
        } else {
            &self.content
        }
    }

    /// Text scanned for year annotations, in priority order.
    pub fn searchable_text(&self) -> String {
        let mut text = String::with_capacity(
            self.title.len() + self.description.len() + self.body().len() + 2,
        );
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.description);
        text.push('\n');
        text.push_str(self.body());
        text
    }
}

/// Listing row; omits full content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub author: String,
    pub year: Option<i32>,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub description: String,
    pub url: Option<String>,
    pub word_count: u32,
    pub tags: BTreeSet<String>,
}

impl From<&DocumentRecord> for DocumentSummary {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            author: record.author.clone(),
            year: record.year,
            doc_type: record.doc_type.clone(),
            description: record.description.clone(),
            url: record.url.clone(),
            word_count: record.word_count,
            tags: record.tags.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub doc_type: String,
    pub count: usize,
}
