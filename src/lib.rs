//! # pdf-rag
//!
//! Retrieval-augmented question answering over your own documents.
//!
//! Documents are split into overlapping chunks, embedded, and appended to a
//! vector index that is saved to disk after every ingest. A question
//! (rewritten into a standalone one when there is prior conversation) is
//! embedded, the four nearest chunks are retrieved, and a language model
//! answers from those chunks alone.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌──────────────┐
//! │ Extract  │──▶│  Chunk  │──▶│  Embed   │──▶│ Vector index │
//! │ PDF/DOCX │   │ overlap │   │ provider │   │  (JSON file) │
//! └──────────┘   └─────────┘   └──────────┘   └──────┬───────┘
//!                                                    │ k = 4
//!            ┌──────────┐   ┌──────────┐   ┌─────────▼──┐
//! question ─▶│ Rewrite  │──▶│  Embed   │──▶│  Generate  │──▶ answer
//!            └──────────┘   └──────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pdfrag ingest ./papers            # index every PDF/DOCX/TXT/MD
//! pdfrag ask "What is the capital of France?" --sources
//! pdfrag chat                       # follow-ups are rewritten
//! pdfrag serve                      # HTTP API on [server].bind
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Text extraction per file type |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat model clients and provider selection |
//! | [`rewrite`] | Follow-up question rewriting |
//! | [`generate`] | Grounded answer generation |
//! | [`store`] | Persistent, lock-protected index handle |
//! | [`pipeline`] | Ingest and query orchestration |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI subcommands |
//!
//! Pure chunking and index logic lives in the `pdf-rag-core` crate.

pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
mod http;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod rewrite;
pub mod server;
pub mod store;

pub use error::RagError;
pub use pipeline::RagPipeline;
