//! The ingest and query orchestrator.
//!
//! # Ingest
//!
//! ```text
//! documents → extract (all, up front) → chunk per page → embed in batches
//!           → insert + save under the index write lock
//! ```
//!
//! Any failure before the commit leaves the index untouched; a failure
//! during the commit is rolled back by [`IndexStore::insert_and_save`].
//!
//! # Query
//!
//! ```text
//! (query, history) → rewrite → embed → search(k = 4) → generate
//! ```
//!
//! An empty index and a missing language model are answered with fixed
//! messages, in that order of precedence, without calling any model.

use std::sync::Arc;

use pdf_rag_core::chunk::Chunker;
use pdf_rag_core::index::ScoredChunk;

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::RagError;
use crate::extract::{extract_pages, ExtractedPage};
use crate::generate::generate;
use crate::llm::{create_model, LanguageModel, LlmSelection};
use crate::models::{
    AnswerStatus, Chunk, ConversationTurn, IngestSummary, QueryOutcome, SourceDocument, SourceRef,
};
use crate::rewrite::rewrite;
use crate::store::IndexStore;

/// Number of chunks retrieved per question.
pub const RETRIEVAL_K: usize = 4;

pub const EMPTY_INDEX_MESSAGE: &str = "Vector store is empty. Please upload some documents first.";
pub const NO_MODEL_MESSAGE: &str = "LLM not initialized. Please check your API keys.";

const DEFAULT_BATCH_SIZE: usize = 64;
const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

pub struct RagPipeline {
    store: Arc<IndexStore>,
    embedder: Arc<dyn Embedder>,
    llm: Option<Arc<dyn LanguageModel>>,
    chunker: Chunker,
    batch_size: usize,
    max_context_chars: usize,
}

impl RagPipeline {
    pub fn new(
        store: Arc<IndexStore>,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<dyn LanguageModel>>,
        chunker: Chunker,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
            chunker,
            batch_size: DEFAULT_BATCH_SIZE,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars.max(1);
        self
    }

    /// Wire up the embedder, model client and index named by `config`.
    pub async fn from_config(config: &Config, selection: &LlmSelection) -> Result<Self, RagError> {
        let chunker = Chunker::new(config.chunking.max_chars, config.chunking.overlap_chars)
            .map_err(|e| RagError::Configuration(e.to_string()))?;
        let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);
        let llm = create_model(selection, &config.llm)?;
        if llm.is_none() {
            tracing::warn!("no language model configured; queries will not be answered");
        }
        let store = IndexStore::open(
            &config.index.path,
            config.index.metric,
            Some(embedder.dims()),
        )
        .await?;

        Ok(Self::new(Arc::new(store), embedder, llm, chunker)
            .with_batch_size(config.embedding.batch_size)
            .with_max_context_chars(config.generation.max_context_chars))
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// `"none"` in degraded mode.
    pub fn llm_provider(&self) -> &str {
        self.llm.as_deref().map(|m| m.name()).unwrap_or("none")
    }

    pub async fn ingest(&self, documents: Vec<SourceDocument>) -> Result<IngestSummary, RagError> {
        let files: Vec<String> = documents.iter().map(|d| d.filename.clone()).collect();
        let extracted = tokio::task::spawn_blocking(move || extract_all(documents))
            .await
            .map_err(|e| RagError::Configuration(format!("extraction task failed: {}", e)))??;

        let mut pages_processed = 0usize;
        let mut chunks: Vec<Chunk> = Vec::new();
        for (filename, pages) in &extracted {
            pages_processed += pages.len();
            let mut next_index = 0i64;
            for page in pages {
                let page_chunks =
                    self.chunker
                        .chunk_page(filename, page.number, &page.text, next_index);
                next_index += page_chunks.len() as i64;
                chunks.extend(page_chunks);
            }
        }

        let summary = IngestSummary {
            pages_processed,
            files_processed: files,
            chunks_indexed: chunks.len(),
        };
        if chunks.is_empty() {
            tracing::info!(pages = pages_processed, "no text to index");
            return Ok(summary);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let vectors = self.embedder.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "expected {} embeddings, provider returned {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            embeddings.extend(vectors);
        }

        self.store.insert_and_save(chunks, embeddings).await?;
        tracing::info!(
            files = summary.files_processed.len(),
            pages = summary.pages_processed,
            chunks = summary.chunks_indexed,
            "ingested documents"
        );
        Ok(summary)
    }

    pub async fn answer(
        &self,
        query: &str,
        history: &[ConversationTurn],
    ) -> Result<QueryOutcome, RagError> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidRequest("query must not be empty".to_string()));
        }
        if self.store.is_empty().await {
            return Ok(QueryOutcome::short_circuit(
                AnswerStatus::NoDocuments,
                EMPTY_INDEX_MESSAGE,
            ));
        }
        let Some(llm) = self.llm.as_deref() else {
            return Ok(QueryOutcome::short_circuit(
                AnswerStatus::ModelUnavailable,
                NO_MODEL_MESSAGE,
            ));
        };

        let rewritten = rewrite(llm, query, history).await;
        let question = rewritten.question();

        let query_vec = self.embedder.embed(question).await?;
        let hits = self.store.search(&query_vec, RETRIEVAL_K).await?;
        tracing::debug!(hits = hits.len(), "retrieved chunks");

        let generated = generate(llm, question, &hits, self.max_context_chars).await?;

        Ok(QueryOutcome {
            answer: generated.answer,
            status: AnswerStatus::Answered,
            sources: source_refs(&hits[..generated.used]),
            rewrite: Some(rewritten),
        })
    }
}

fn extract_all(
    documents: Vec<SourceDocument>,
) -> Result<Vec<(String, Vec<ExtractedPage>)>, RagError> {
    documents
        .into_iter()
        .map(|doc| {
            let pages = extract_pages(&doc.filename, &doc.bytes).map_err(|source| {
                RagError::Extraction {
                    file: doc.filename.clone(),
                    source,
                }
            })?;
            Ok((doc.filename, pages))
        })
        .collect()
}

fn source_refs(hits: &[ScoredChunk]) -> Vec<SourceRef> {
    hits.iter()
        .map(|h| SourceRef {
            filename: h.chunk.document_id.clone(),
            page: h.chunk.page,
            chunk_id: h.chunk.id.clone(),
            score: h.score,
        })
        .collect()
}
