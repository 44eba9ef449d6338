//! Typed errors for the ingest and query pipeline.
//!
//! Library code returns [`RagError`]; the `pdfrag` binary converts it into
//! `anyhow::Error` at the edge and the HTTP server maps each variant to a
//! status code and error code.

use std::path::PathBuf;

use pdf_rag_core::index::IndexError;
use thiserror::Error;

use crate::extract::ExtractError;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("failed to extract text from {file}: {source}")]
    Extraction {
        file: String,
        #[source]
        source: ExtractError,
    },

    #[error("language model call failed: {0}")]
    ModelCall(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("I/O error on {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RagError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RagError::Persistence {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_error_is_transparent() {
        let err: RagError = IndexError::DimensionMismatch {
            expected: 3,
            actual: 2,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "embedding dimension mismatch: index expects 3, got 2"
        );
    }

    #[test]
    fn test_persistence_names_path() {
        let err = RagError::persistence(
            "/tmp/index.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/index.json"));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_extraction_names_file() {
        let err = RagError::Extraction {
            file: "notes.xyz".to_string(),
            source: ExtractError::UnsupportedFileType("notes.xyz".to_string()),
        };
        assert!(err.to_string().starts_with("failed to extract text from notes.xyz"));
    }
}
