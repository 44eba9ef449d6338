//! HTTP API.
//!
//! A thin JSON transport over [`RagPipeline::ingest`] and
//! [`RagPipeline::answer`]. The server holds no chat state; clients send the
//! conversation so far with every query.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Welcome message |
//! | `GET`  | `/health` | Version, index stats and model provider |
//! | `POST` | `/upload` | Multipart `files` → ingest summary |
//! | `POST` | `/query` | `{query, chat_history}` → `{answer, sources}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unsupported_file` (400),
//! `extraction_failed` (422), `model_error` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser chat UI can
//! be served from anywhere.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pdf_rag_core::index::IndexStats;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::RagError;
use crate::extract::{is_supported, ExtractError};
use crate::llm::LlmSelection;
use crate::models::{ConversationTurn, SourceDocument, SourceRef};
use crate::pipeline::RagPipeline;

/// Build the pipeline from `config` and serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let selection = LlmSelection::from_env(&config.llm);
    let pipeline = Arc::new(RagPipeline::from_config(config, &selection).await?);
    let app = router(pipeline, config.server.max_upload_mb * 1024 * 1024);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, llm = selection.provider_name(), "server listening");
    println!("Listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(pipeline: Arc<RagPipeline>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/upload", post(handle_upload))
        .route("/query", post(handle_query))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(pipeline)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let message = err.to_string();
        match err {
            RagError::InvalidRequest(_) => AppError::bad_request(message),
            RagError::Extraction {
                source: ExtractError::UnsupportedFileType(_),
                ..
            } => AppError::new(StatusCode::BAD_REQUEST, "unsupported_file", message),
            RagError::Extraction { .. } => {
                AppError::new(StatusCode::UNPROCESSABLE_ENTITY, "extraction_failed", message)
            }
            RagError::ModelCall(_) | RagError::Embedding(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, "model_error", message)
            }
            RagError::Configuration(_) | RagError::Index(_) | RagError::Persistence { .. } => {
                tracing::error!(error = %message, "request failed");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

// ============ GET / ============

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn handle_root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Welcome to the PDF RAG Chatbot API",
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    index: IndexStats,
    llm: String,
}

async fn handle_health(State(pipeline): State<Arc<RagPipeline>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        index: pipeline.store().stats().await,
        llm: pipeline.llm_provider().to_string(),
    })
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    files_processed: Vec<String>,
    pages_processed: usize,
    chunks_indexed: usize,
}

async fn handle_upload(
    State(pipeline): State<Arc<RagPipeline>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut documents = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field
            .file_name()
            .and_then(|n| Path::new(n).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::bad_request("uploaded file is missing a filename"))?;
        if !is_supported(&filename) {
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "unsupported_file",
                format!("unsupported file type: {}", filename),
            ));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::bad_request(format!("failed to read {}: {}", filename, e)))?;
        tracing::info!(file = %filename, bytes = bytes.len(), "received upload");
        documents.push(SourceDocument::new(filename, bytes.to_vec()));
    }

    if documents.is_empty() {
        return Err(AppError::bad_request("no files uploaded"));
    }

    let summary = pipeline.ingest(documents).await?;
    Ok(Json(UploadResponse {
        message: summary.message(),
        files_processed: summary.files_processed,
        pages_processed: summary.pages_processed,
        chunks_indexed: summary.chunks_indexed,
    }))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    chat_history: Vec<ConversationTurn>,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    sources: Vec<SourceRef>,
}

async fn handle_query(
    State(pipeline): State<Arc<RagPipeline>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let outcome = pipeline
        .answer(&request.query, &request.chat_history)
        .await?;
    Ok(Json(QueryResponse {
        answer: outcome.answer,
        sources: outcome.sources,
    }))
}
