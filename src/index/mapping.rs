use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::IndexError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub position: usize,
    pub document_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantinedEntry {
    pub position: usize,
    pub document_id: String,
    pub reason: QuarantineReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineReason {
    DuplicatePosition,
    EmptyDocumentId,
    OutOfRange,
}

#[derive(Serialize, Deserialize)]
struct MappingFile {
    build_id: String,
    #[serde(default)]
    index_sha256: String,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

/// Strict `position -> document_id` companion of one index build.
#[derive(Debug, Clone)]
pub struct PositionMap {
    build_id: String,
    index_sha256: String,
    dimension: usize,
    by_position: BTreeMap<usize, String>,
    quarantined: Vec<QuarantinedEntry>,
}

impl PositionMap {
    /// Later duplicates of a position and blank ids are quarantined, not merged.
    pub fn new(
        build_id: impl Into<String>,
        index_sha256: impl Into<String>,
        dimension: usize,
        entries: Vec<IndexEntry>,
    ) -> Self {
        let mut by_position = BTreeMap::new();
        let mut quarantined = Vec::new();

        for entry in entries {
            let document_id = entry.document_id.trim().to_string();
            if document_id.is_empty() {
                quarantined.push(QuarantinedEntry {
                    position: entry.position,
                    document_id,
                    reason: QuarantineReason::EmptyDocumentId,
                });
                continue;
            }
            if by_position.contains_key(&entry.position) {
                quarantined.push(QuarantinedEntry {
                    position: entry.position,
                    document_id,
                    reason: QuarantineReason::DuplicatePosition,
                });
                continue;
            }
            by_position.insert(entry.position, document_id);
        }

        Self {
            build_id: build_id.into(),
            index_sha256: index_sha256.into(),
            dimension,
            by_position,
            quarantined,
        }
    }

    pub fn read_from(path: &Path) -> Result<Self, IndexError> {
        if !path.exists() {
            return Err(IndexError::Missing(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        let file: MappingFile = serde_json::from_str(&raw)
            .map_err(|e| IndexError::Format(format!("mapping {}: {}", path.display(), e)))?;
        Ok(Self::new(
            file.build_id,
            file.index_sha256,
            file.dimension,
            file.entries,
        ))
    }

    pub fn write_to(&self, path: &Path) -> Result<(), IndexError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = MappingFile {
            build_id: self.build_id.clone(),
            index_sha256: self.index_sha256.clone(),
            dimension: self.dimension,
            entries: self
                .by_position
                .iter()
                .map(|(position, document_id)| IndexEntry {
                    position: *position,
                    document_id: document_id.clone(),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| IndexError::Format(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Quarantines entries pointing past the end of an index with `len` vectors.
    pub fn restrict_to(&mut self, len: usize) {
        let out_of_range = self.by_position.split_off(&len);
        self.quarantined
            .extend(out_of_range.into_iter().map(|(position, document_id)| {
                QuarantinedEntry {
                    position,
                    document_id,
                    reason: QuarantineReason::OutOfRange,
                }
            }));
    }

    pub fn resolve(&self, position: usize) -> Option<&str> {
        self.by_position.get(&position).map(String::as_str)
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn index_sha256(&self) -> &str {
        &self.index_sha256
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.by_position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_position.is_empty()
    }

    pub fn quarantined(&self) -> &[QuarantinedEntry] {
        &self.quarantined
    }
}
