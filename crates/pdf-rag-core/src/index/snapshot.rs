//! Serializable form of a [`VectorIndex`].
//!
//! A snapshot is a versioned JSON document. Vectors are stored as base64 of
//! their little-endian `f32` bytes so they round-trip bit-exactly, which
//! keeps search scores identical after a reload.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{IndexEntry, IndexError, Metric, VectorIndex};
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::Chunk;

/// Current on-disk format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub version: u32,
    pub metric: Metric,
    pub dims: Option<usize>,
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub chunk: Chunk,
    /// Base64 of the little-endian `f32` bytes.
    pub vector: String,
}

impl VectorIndex {
    pub fn to_snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            version: SNAPSHOT_VERSION,
            metric: self.metric,
            dims: self.dims,
            entries: self
                .entries
                .iter()
                .map(|e| SnapshotEntry {
                    chunk: e.chunk.clone(),
                    vector: STANDARD.encode(vec_to_blob(&e.vector)),
                })
                .collect(),
        }
    }

    /// Rebuild an index, validating version, encoding and dimensions.
    pub fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self, IndexError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(IndexError::Snapshot(format!(
                "unsupported version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        let mut entries = Vec::with_capacity(snapshot.entries.len());
        for (i, entry) in snapshot.entries.into_iter().enumerate() {
            let bytes = STANDARD
                .decode(entry.vector.as_bytes())
                .map_err(|e| IndexError::Snapshot(format!("entry {}: {}", i, e)))?;
            let vector = blob_to_vec(&bytes).ok_or_else(|| {
                IndexError::Snapshot(format!("entry {}: truncated vector", i))
            })?;
            if let Some(dims) = snapshot.dims {
                if vector.len() != dims {
                    return Err(IndexError::DimensionMismatch {
                        expected: dims,
                        actual: vector.len(),
                    });
                }
            }
            entries.push(IndexEntry {
                chunk: entry.chunk,
                vector,
            });
        }

        if snapshot.dims.is_none() && !entries.is_empty() {
            return Err(IndexError::Snapshot(
                "entries present but dimension missing".to_string(),
            ));
        }

        Ok(Self {
            metric: snapshot.metric,
            dims: snapshot.dims,
            entries,
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, IndexError> {
        serde_json::to_vec(&self.to_snapshot()).map_err(|e| IndexError::Snapshot(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, IndexError> {
        let snapshot: IndexSnapshot =
            serde_json::from_slice(bytes).map_err(|e| IndexError::Snapshot(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }
}
