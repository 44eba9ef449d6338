//! Request and result types that flow through the pipeline.
//!
//! Chunk and conversation types live in `pdf_rag_core::models` and are
//! re-exported here.

use std::path::Path;

use serde::Serialize;

use crate::error::RagError;
use crate::rewrite::Rewrite;

pub use pdf_rag_core::models::{Chunk, ConversationTurn, Role};

/// An uploaded file. Only lives for the duration of an ingest call.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Read a file from disk; the filename is the path's final component.
    pub async fn from_path(path: &Path) -> Result<Self, RagError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RagError::persistence(path, e))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { filename, bytes })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub pages_processed: usize,
    pub files_processed: Vec<String>,
    pub chunks_indexed: usize,
}

impl IngestSummary {
    pub fn message(&self) -> String {
        format!(
            "Processed {} pages from {} files.",
            self.pages_processed,
            self.files_processed.len()
        )
    }
}

/// How a query was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    Answered,
    NoDocuments,
    ModelUnavailable,
}

/// Provenance of a chunk that was placed in the answer prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub filename: String,
    pub page: u32,
    pub chunk_id: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub answer: String,
    pub status: AnswerStatus,
    /// `None` on the short-circuit paths, where no rewrite is attempted.
    pub rewrite: Option<Rewrite>,
    pub sources: Vec<SourceRef>,
}

impl QueryOutcome {
    pub(crate) fn short_circuit(status: AnswerStatus, answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            status,
            rewrite: None,
            sources: Vec::new(),
        }
    }
}
