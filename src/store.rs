//! The persistent index handle.
//!
//! [`IndexStore`] pairs the in-memory [`VectorIndex`] with the file it is
//! saved to. Ingests take the write lock for insert + save, so concurrent
//! ingests are serialized and the file always holds every committed entry.
//! Searches take the read lock.
//!
//! Saving writes a temp file in the target directory and renames it over the
//! target, so a crash mid-save leaves the previous snapshot intact.

use std::io::Write;
use std::path::{Path, PathBuf};

use pdf_rag_core::index::{IndexStats, Metric, ScoredChunk, VectorIndex};
use pdf_rag_core::models::Chunk;
use tokio::sync::RwLock;

use crate::error::RagError;

pub struct IndexStore {
    path: PathBuf,
    index: RwLock<VectorIndex>,
}

impl IndexStore {
    /// Load the snapshot at `path`, or start empty if there is none.
    ///
    /// A snapshot that exists but cannot be decoded is an error. When the
    /// snapshot's metric differs from `metric` the snapshot wins. When
    /// `dims` is given and disagrees with the snapshot, that is a
    /// configuration error.
    pub async fn open(path: &Path, metric: Metric, dims: Option<usize>) -> Result<Self, RagError> {
        let owned = path.to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || read_snapshot(&owned))
            .await
            .map_err(|e| RagError::Configuration(format!("index load task failed: {}", e)))??;

        let index = match loaded {
            Some(index) => {
                if index.metric() != metric {
                    tracing::warn!(
                        configured = %metric,
                        stored = %index.metric(),
                        "index was built with a different metric; keeping the stored one"
                    );
                }
                if let (Some(want), Some(have)) = (dims, index.dims()) {
                    if want != have {
                        return Err(RagError::Configuration(format!(
                            "index at {} holds {}-dimensional vectors but the embedder produces {}; \
                             re-ingest into a new index path",
                            path.display(),
                            have,
                            want
                        )));
                    }
                }
                tracing::info!(path = %path.display(), entries = index.len(), "loaded index");
                index
            }
            None => match dims {
                Some(d) => VectorIndex::with_dims(metric, d),
                None => VectorIndex::new(metric),
            },
        };

        Ok(Self {
            path: path.to_path_buf(),
            index: RwLock::new(index),
        })
    }

    /// An unsaved-so-far store at `path` wrapping `index`.
    pub fn with_index(path: impl Into<PathBuf>, index: VectorIndex) -> Self {
        Self {
            path: path.into(),
            index: RwLock::new(index),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append and persist as one commit.
    ///
    /// If either step fails the in-memory index is rolled back, so memory and
    /// disk never disagree about what was committed.
    pub async fn insert_and_save(
        &self,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize, RagError> {
        let mut index = self.index.write().await;
        let checkpoint = index.checkpoint();
        let added = chunks.len();

        index.insert(chunks, embeddings)?;

        let result = match index.to_json() {
            Ok(bytes) => {
                let path = self.path.clone();
                tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
                    .await
                    .map_err(|e| {
                        RagError::persistence(
                            &self.path,
                            std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                        )
                    })
                    .and_then(|r| r)
            }
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            index.rollback(checkpoint);
            return Err(e);
        }
        Ok(added)
    }

    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, RagError> {
        Ok(self.index.read().await.search(query, k)?)
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn stats(&self) -> IndexStats {
        self.index.read().await.stats()
    }
}

fn read_snapshot(path: &Path) -> Result<Option<VectorIndex>, RagError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RagError::persistence(path, e)),
    };
    Ok(Some(VectorIndex::from_json(&bytes)?))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RagError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| RagError::persistence(&dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| RagError::persistence(&dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| RagError::persistence(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| RagError::persistence(path, e.error))?;
    Ok(())
}
