use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use pdf_rag::embedding::HashEmbedder;
use pdf_rag::llm::LanguageModel;
use pdf_rag::pipeline::{RagPipeline, EMPTY_INDEX_MESSAGE};
use pdf_rag::server::router;
use pdf_rag::store::IndexStore;
use pdf_rag::RagError;
use pdf_rag_core::chunk::Chunker;
use pdf_rag_core::index::{Metric, VectorIndex};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "pdfragtestboundary";

/// Returns the context block of the answer prompt verbatim.
struct ContextEcho;

#[async_trait]
impl LanguageModel for ContextEcho {
    fn name(&self) -> &str {
        "echo"
    }
    fn model(&self) -> &str {
        "echo-1"
    }
    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        if prompt.ends_with("Standalone question:") {
            return Err(RagError::ModelCall("no rewrites here".into()));
        }
        Ok(prompt
            .split("Context: ")
            .nth(1)
            .and_then(|rest| rest.split("\n\nQuestion:").next())
            .unwrap_or_default()
            .to_string())
    }
}

fn app(tmp: &TempDir, llm: Option<Arc<dyn LanguageModel>>) -> Router {
    let store = IndexStore::with_index(
        tmp.path().join("index.json"),
        VectorIndex::new(Metric::Cosine),
    );
    let pipeline = RagPipeline::new(
        Arc::new(store),
        Arc::new(HashEmbedder::new(128)),
        llm,
        Chunker::new(1000, 200).unwrap(),
    );
    router(Arc::new(pipeline), 10 * 1024 * 1024)
}

fn multipart(files: &[(&str, &str)]) -> Body {
    let mut body = Vec::new();
    for (name, content) in files {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n",
                name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    Body::from(body)
}

async fn upload(app: &Router, files: &[(&str, &str)]) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(multipart(files))
        .unwrap();
    send(app, request).await
}

async fn query(app: &Router, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

#[tokio::test]
async fn test_root_welcome() {
    let tmp = TempDir::new().unwrap();
    let (status, body) = get(&app(&tmp, None), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Welcome to the PDF RAG Chatbot API");
}

#[tokio::test]
async fn test_health_reports_index_and_llm() {
    let tmp = TempDir::new().unwrap();
    let (status, body) = get(&app(&tmp, None), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["index"]["entries"], 0);
    assert_eq!(body["index"]["metric"], "cosine");
    assert_eq!(body["llm"], "none");
}

#[tokio::test]
async fn test_query_on_empty_index() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp, Some(Arc::new(ContextEcho)));
    let (status, body) = query(&app, json!({"query": "hello?", "chat_history": []})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], EMPTY_INDEX_MESSAGE);
    assert_eq!(body["sources"], json!([]));
}

#[tokio::test]
async fn test_upload_then_query() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp, Some(Arc::new(ContextEcho)));

    let (status, body) = upload(
        &app,
        &[
            ("capital.txt", "The capital of France is Paris."),
            ("notes.md", "# Notes\n\nBananas are yellow."),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["message"], "Processed 2 pages from 2 files.");
    assert_eq!(body["files_processed"], json!(["capital.txt", "notes.md"]));

    let (status, body) = query(
        &app,
        json!({
            "query": "What is the capital of France?",
            "chat_history": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert!(body["answer"].as_str().unwrap().contains("Paris"));
    assert_eq!(body["sources"][0]["filename"], "capital.txt");
    assert_eq!(body["sources"][0]["page"], 1);
}

#[tokio::test]
async fn test_query_history_defaults_to_empty() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp, None);
    upload(&app, &[("a.txt", "alpha")]).await;
    let (status, body) = query(&app, json!({"query": "alpha?"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "LLM not initialized. Please check your API keys.");
}

#[tokio::test]
async fn test_blank_query_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let (status, body) = query(&app(&tmp, None), json!({"query": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_unsupported_upload_rejected() {
    let tmp = TempDir::new().unwrap();
    let (status, body) = upload(&app(&tmp, None), &[("photo.png", "PNG")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "unsupported_file");
}

#[tokio::test]
async fn test_broken_pdf_is_unprocessable_and_commits_nothing() {
    let tmp = TempDir::new().unwrap();
    let app = app(&tmp, None);
    let (status, body) = upload(
        &app,
        &[("ok.txt", "fine"), ("broken.pdf", "definitely not a pdf")],
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "extraction_failed");

    let (_, health) = get(&app, "/health").await;
    assert_eq!(health["index"]["entries"], 0);
}

#[tokio::test]
async fn test_upload_without_files() {
    let tmp = TempDir::new().unwrap();
    let (status, body) = upload(&app(&tmp, None), &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}
