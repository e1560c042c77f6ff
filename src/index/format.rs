//! Flat L2 vector index stored as a little-endian binary file.
//!
//! Layout: magic `ANVI`, `u32` version, `u32` dimension, `u64` count,
//! `u32` build id length + UTF-8 build id, then `count * dimension` `f32` rows.

use std::fs;
use std::path::Path;

use ndarray::{Array2, ArrayView1};
use sha2::{Digest, Sha256};

use super::IndexError;

const MAGIC: &[u8; 4] = b"ANVI";
const VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    /// Squared euclidean distance; lower is closer.
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    build_id: String,
    vectors: Array2<f32>,
}

impl VectorIndex {
    pub fn from_rows(
        build_id: impl Into<String>,
        dimension: usize,
        rows: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::Format("dimension must be positive".to_string()));
        }
        let count = rows.len();
        let mut flat = Vec::with_capacity(count * dimension);
        for (position, row) in rows.into_iter().enumerate() {
            if row.len() != dimension {
                return Err(IndexError::Format(format!(
                    "row {} has {} components, expected {}",
                    position,
                    row.len(),
                    dimension
                )));
            }
            flat.extend(row);
        }
        let vectors = Array2::from_shape_vec((count, dimension), flat)
            .map_err(|e| IndexError::Format(e.to_string()))?;
        Ok(Self {
            build_id: build_id.into(),
            vectors,
        })
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exhaustive nearest-neighbour search, ascending by distance then position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query = ArrayView1::from(query);
        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .rows()
            .into_iter()
            .enumerate()
            .map(|(position, row)| {
                let diff = &row - &query;
                Neighbor {
                    position,
                    distance: diff.dot(&diff),
                }
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let build_id = self.build_id.as_bytes();
        let mut bytes =
            Vec::with_capacity(24 + build_id.len() + self.len() * self.dimension() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension() as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&(build_id.len() as u32).to_le_bytes());
        bytes.extend_from_slice(build_id);
        for value in self.vectors.iter() {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut cursor = Cursor { bytes, offset: 0 };

        if cursor.take(4)? != MAGIC {
            return Err(IndexError::Format("bad magic".to_string()));
        }
        let version = cursor.u32()?;
        if version != VERSION {
            return Err(IndexError::Format(format!("unsupported version {}", version)));
        }
        let dimension = cursor.u32()? as usize;
        let count = usize::try_from(cursor.u64()?)
            .map_err(|_| IndexError::Format("vector count overflows".to_string()))?;
        let id_len = cursor.u32()? as usize;
        let build_id = std::str::from_utf8(cursor.take(id_len)?)
            .map_err(|e| IndexError::Format(format!("build id is not UTF-8: {}", e)))?
            .to_string();

        if dimension == 0 {
            return Err(IndexError::Format("dimension must be positive".to_string()));
        }
        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| IndexError::Format("vector payload overflows".to_string()))?;
        let payload = cursor.take(expected)?;
        if cursor.remaining() != 0 {
            return Err(IndexError::Format(format!(
                "{} trailing bytes after vectors",
                cursor.remaining()
            )));
        }

        let flat: Vec<f32> = payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let vectors = Array2::from_shape_vec((count, dimension), flat)
            .map_err(|e| IndexError::Format(e.to_string()))?;

        Ok(Self { build_id, vectors })
    }

    /// Reads the index and returns it with the SHA-256 of the file contents.
    pub fn read_from(path: &Path) -> Result<(Self, String), IndexError> {
        if !path.exists() {
            return Err(IndexError::Missing(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        let checksum = sha256_hex(&bytes);
        Ok((Self::from_bytes(&bytes)?, checksum))
    }

    /// Writes the index and returns the SHA-256 the companion mapping must carry.
    pub fn write_to(&self, path: &Path) -> Result<String, IndexError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = self.to_bytes();
        fs::write(path, &bytes)?;
        Ok(sha256_hex(&bytes))
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], IndexError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| IndexError::Format("unexpected end of index file".to_string()))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, IndexError> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn u64(&mut self) -> Result<u64, IndexError> {
        let raw = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(u64::from_le_bytes(buf))
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VectorIndex {
        VectorIndex::from_rows(
            "build-a",
            2,
            vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 3.0], vec![1.0, 0.0]],
        )
        .unwrap()
    }

    #[test]
    fn search_orders_by_distance_then_position() {
        let index = sample();
        let hits = index.search(&[0.9, 0.0], 3).unwrap();

        let positions: Vec<usize> = hits.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![1, 3, 0]);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn search_rejects_wrong_dimension() {
        let err = sample().search(&[1.0, 2.0, 3.0], 1).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn file_round_trip_reports_stable_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector_index").join("index.bin");
        let index = sample();

        let written = index.write_to(&path).unwrap();
        let (loaded, read) = VectorIndex::read_from(&path).unwrap();

        assert_eq!(written, read);
        assert_eq!(loaded.build_id(), "build-a");
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.search(&[0.0, 3.0], 1).unwrap()[0].position, 2);
    }

    #[test]
    fn truncated_payload_is_a_format_error() {
        let mut bytes = sample().to_bytes();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            VectorIndex::from_bytes(&bytes),
            Err(IndexError::Format(_))
        ));
        assert!(matches!(
            VectorIndex::from_bytes(b"NOPE"),
            Err(IndexError::Format(_))
        ));
    }
}
