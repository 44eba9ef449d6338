//! Append-only exact nearest-neighbor index over chunk embeddings.
//!
//! The index owns `(Chunk, vector)` pairs in insertion order. Its dimension
//! is fixed by the first insert (or up front with [`VectorIndex::with_dims`])
//! and its [`Metric`] is fixed at creation.
//!
//! Search is brute force over every entry. Results are ordered best-first;
//! equal scores keep insertion order, so a search is fully deterministic.
//!
//! ```rust
//! use pdf_rag_core::chunk::chunk_text;
//! use pdf_rag_core::index::{Metric, VectorIndex};
//!
//! let mut index = VectorIndex::new(Metric::Cosine);
//! let chunks = chunk_text("a.txt", 1, "alpha", 100, 10).unwrap();
//! index.insert(chunks, vec![vec![1.0, 0.0]]).unwrap();
//!
//! let hits = index.search(&[1.0, 0.0], 4).unwrap();
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].chunk.text, "alpha");
//! ```

mod snapshot;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::{cosine_similarity, l2_distance};
use crate::models::Chunk;

pub use snapshot::{IndexSnapshot, SnapshotEntry, SNAPSHOT_VERSION};

/// Errors raised by index mutation, search, or snapshot decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("got {chunks} chunks but {embeddings} embeddings")]
    LengthMismatch { chunks: usize, embeddings: usize },
    #[error("embedding must not be empty")]
    EmptyEmbedding,
    #[error("invalid index snapshot: {0}")]
    Snapshot(String),
}

/// Similarity metric, fixed for the lifetime of an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity; higher is better.
    #[default]
    Cosine,
    /// Euclidean distance; lower is better.
    L2,
}

impl Metric {
    /// Raw score of `candidate` against `query` under this metric.
    pub fn score(self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_similarity(query, candidate),
            Metric::L2 => l2_distance(query, candidate),
        }
    }

    /// Orders `a` before `b` when `a` is the more relevant score.
    fn rank(self, a: f32, b: f32) -> Ordering {
        match self {
            Metric::Cosine => b.total_cmp(&a),
            Metric::L2 => a.total_cmp(&b),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::L2 => "l2",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(Metric::Cosine),
            "l2" => Ok(Metric::L2),
            other => Err(format!(
                "unknown metric '{}'; expected cosine or l2",
                other
            )),
        }
    }
}

/// A stored `(Chunk, vector)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity or L2 distance, depending on the index metric.
    pub score: f32,
}

/// Summary used by status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub entries: usize,
    pub documents: usize,
    pub dims: Option<usize>,
    pub metric: Metric,
}

/// Opaque marker returned by [`VectorIndex::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    len: usize,
    dims: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    metric: Metric,
    dims: Option<usize>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// An empty index whose dimension is set by the first insert.
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            dims: None,
            entries: Vec::new(),
        }
    }

    /// An empty index that only accepts `dims`-long vectors.
    pub fn with_dims(metric: Metric, dims: usize) -> Self {
        Self {
            metric,
            dims: Some(dims),
            entries: Vec::new(),
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Append `chunks[i]` paired with `embeddings[i]`.
    ///
    /// Every embedding is validated before anything is appended, so a
    /// rejected call leaves the index untouched. Empty input is a no-op.
    pub fn insert(
        &mut self,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<(), IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }
        let Some(first) = embeddings.first() else {
            return Ok(());
        };

        let expected = self.dims.unwrap_or(first.len());
        if expected == 0 {
            return Err(IndexError::EmptyEmbedding);
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        self.dims = Some(expected);
        self.entries.extend(
            chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, vector)| IndexEntry { chunk, vector }),
        );
        Ok(())
    }

    /// Up to `k` nearest entries, best first.
    ///
    /// An empty index yields an empty result for any query. Against a
    /// non-empty index the query must match the index dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dims {
            if query.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let metric = self.metric;
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (pos, metric.score(query, &entry.vector)))
            .collect();

        // Position breaks ties, which makes the order total.
        let by_rank = |a: &(usize, f32), b: &(usize, f32)| metric.rank(a.1, b.1).then(a.0.cmp(&b.0));

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_rank);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_rank);

        Ok(scored
            .into_iter()
            .map(|(pos, score)| ScoredChunk {
                chunk: self.entries[pos].chunk.clone(),
                score,
            })
            .collect())
    }

    pub fn stats(&self) -> IndexStats {
        let documents: HashSet<&str> = self
            .entries
            .iter()
            .map(|e| e.chunk.document_id.as_str())
            .collect();
        IndexStats {
            entries: self.entries.len(),
            documents: documents.len(),
            dims: self.dims,
            metric: self.metric,
        }
    }

    /// Record the current size so a later failed commit can be undone.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.entries.len(),
            dims: self.dims,
        }
    }

    /// Drop everything appended since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.entries.truncate(checkpoint.len);
        self.dims = checkpoint.dims;
    }
}
