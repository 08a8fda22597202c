//! HTTP surface tests driven through the router

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use fincrew_core::config::DEFAULT_QUERY;
use fincrew_gateway::{build_router, AppState};
use fincrew_pipeline::{
    FsDocumentStore, JobContext, JobManager, JobPipeline, NodeError, PipelineError, StageFailure,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BOUNDARY: &str = "fincrew-test-boundary";

/// Echoes the query and document, or fails when asked to.
struct EchoPipeline;

#[async_trait::async_trait]
impl JobPipeline for EchoPipeline {
    async fn run(&self, job: JobContext) -> Result<String, PipelineError> {
        let document = tokio::fs::read_to_string(&job.document_path).await.unwrap_or_default();
        if job.query == "fail" {
            return Err(StageFailure {
                node_id: "verification".into(),
                cause: NodeError::UnboundRole("verifier".into()),
            }
            .into());
        }
        Ok(format!("memo for '{}': {}", job.query, document))
    }
}

fn app(dir: &std::path::Path) -> Router {
    let jobs = JobManager::new(Arc::new(EchoPipeline), Arc::new(FsDocumentStore::new(dir)));
    build_router(Arc::new(AppState { jobs: Arc::new(jobs) }))
}

fn form(file: Option<&str>, query: Option<&str>) -> Request<Body> {
    let mut body = String::new();
    if let Some(content) = file {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"acme_10k.pdf\"\r\n\
             Content-Type: application/pdf\r\n\r\n{content}\r\n"
        ));
    }
    if let Some(q) = query {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"query\"\r\n\r\n{q}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::builder()
        .method("POST")
        .uri("/analyze")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn wait_terminal(app: &Router, status_url: &str) -> Value {
    for _ in 0..500 {
        let (code, body) = call(app, get(status_url)).await;
        assert_eq!(code, StatusCode::OK);
        if body["status"] == "completed" || body["status"] == "failed" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job at {} never finished", status_url);
}

// ===========================================================================
// Liveness
// ===========================================================================

#[tokio::test]
async fn root_reports_running() {
    let dir = tempfile::tempdir().unwrap();
    let (code, body) = call(&app(dir.path()), get("/")).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["message"], "Financial Document Analyzer API is running");
}

#[tokio::test]
async fn health_reports_job_counts() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    let (_, submitted) = call(&app, form(Some("ACME Corp"), Some("q"))).await;
    wait_terminal(&app, submitted["status_url"].as_str().unwrap()).await;

    let (code, body) = call(&app, get("/health")).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["jobs"]["completed"], 1);
    assert_eq!(body["jobs"]["failed"], 0);
}

// ===========================================================================
// Analyze and status
// ===========================================================================

#[tokio::test]
async fn analyze_then_poll_until_completed() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());

    let (code, body) = call(&app, form(Some("ACME Corp revenue $10M"), Some("Should I buy?"))).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["message"], "Document received and processing started");
    assert_eq!(body["query"], "Should I buy?");
    assert_eq!(body["file_processed"], "acme_10k.pdf");
    let job_id = body["job_id"].as_str().unwrap();
    assert_eq!(body["status_url"], format!("/status/{}", job_id));

    let done = wait_terminal(&app, body["status_url"].as_str().unwrap()).await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["result"], "memo for 'Should I buy?': ACME Corp revenue $10M");
    assert!(done.get("error").is_none());
    assert!(!dir.path().join(format!("financial_document_{}.pdf", job_id)).exists());
}

#[tokio::test]
async fn analyze_without_query_uses_default() {
    let dir = tempfile::tempdir().unwrap();
    let (code, body) = call(&app(dir.path()), form(Some("ACME"), None)).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["query"], DEFAULT_QUERY);

    let (_, body) = call(&app(dir.path()), form(Some("ACME"), Some("  "))).await;
    assert_eq!(body["query"], DEFAULT_QUERY);
}

#[tokio::test]
async fn failed_job_reports_error_without_result() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path());
    let (_, body) = call(&app, form(Some("ACME"), Some("fail"))).await;
    let done = wait_terminal(&app, body["status_url"].as_str().unwrap()).await;
    assert_eq!(done["status"], "failed");
    assert!(done["error"].as_str().unwrap().contains("verification"));
    assert!(done.get("result").is_none());
}

#[tokio::test]
async fn unknown_job_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let (code, body) = call(&app(dir.path()), get("/status/no-such-job")).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Job ID not found");
}

#[tokio::test]
async fn empty_file_is_processing_error() {
    let dir = tempfile::tempdir().unwrap();
    let (code, body) = call(&app(dir.path()), form(Some(""), Some("q"))).await;
    assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().starts_with("Error processing document:"));
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (code, body) = call(&app(dir.path()), form(None, Some("q"))).await;
    assert_eq!(code, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("file"));
}
