//! Vector Index artifacts: the binary vector file and its position mapping,
//! always loaded and validated as a matched pair.

pub mod format;
pub mod mapping;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use format::{sha256_hex, Neighbor, VectorIndex};
pub use mapping::{IndexEntry, PositionMap, QuarantineReason, QuarantinedEntry};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index artifact missing: {0}")]
    Missing(PathBuf),
    #[error("index i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid index format: {0}")]
    Format(String),
    #[error("index build '{index}' does not match mapping build '{mapping}'")]
    BuildMismatch { index: String, mapping: String },
    #[error("index checksum mismatch: mapping expects {expected}, file has {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("query vector has dimension {actual}, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// A loaded index with the mapping that was validated against it.
#[derive(Debug, Clone)]
pub struct IndexBundle {
    index: VectorIndex,
    mapping: PositionMap,
}

impl IndexBundle {
    pub fn new(index: VectorIndex, mut mapping: PositionMap) -> Result<Self, IndexError> {
        if mapping.build_id() != index.build_id() {
            return Err(IndexError::BuildMismatch {
                index: index.build_id().to_string(),
                mapping: mapping.build_id().to_string(),
            });
        }
        if mapping.dimension() != index.dimension() {
            return Err(IndexError::Format(format!(
                "mapping declares dimension {}, index has {}",
                mapping.dimension(),
                index.dimension()
            )));
        }
        mapping.restrict_to(index.len());
        Ok(Self { index, mapping })
    }

    /// Loads both files; any mismatch rejects the pair as a whole.
    pub fn load(index_path: &Path, mapping_path: &Path) -> Result<Self, IndexError> {
        let (index, checksum) = VectorIndex::read_from(index_path)?;
        let mapping = PositionMap::read_from(mapping_path)?;

        let expected = mapping.index_sha256();
        if !expected.is_empty() && !expected.eq_ignore_ascii_case(&checksum) {
            return Err(IndexError::ChecksumMismatch {
                expected: expected.to_string(),
                actual: checksum,
            });
        }

        let bundle = Self::new(index, mapping)?;
        if !bundle.mapping.quarantined().is_empty() {
            tracing::warn!(
                quarantined = bundle.mapping.quarantined().len(),
                "Index mapping has entries that cannot be used"
            );
        }
        Ok(bundle)
    }

    /// Writes a matched pair, stamping the mapping with the index checksum.
    pub fn write_pair(
        index: &VectorIndex,
        entries: Vec<IndexEntry>,
        index_path: &Path,
        mapping_path: &Path,
    ) -> Result<(), IndexError> {
        let checksum = index.write_to(index_path)?;
        PositionMap::new(index.build_id(), checksum, index.dimension(), entries)
            .write_to(mapping_path)
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn mapping(&self) -> &PositionMap {
        &self.mapping
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }
}
