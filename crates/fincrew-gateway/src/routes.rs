//! HTTP handlers and their error mapping

use crate::server::AppState;
use axum::{
    extract::{Multipart, Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fincrew_core::{Error, JobStatus};
use fincrew_pipeline::UploadedDocument;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Job ID not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("Error processing document: {0}")]
    Processing(String),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::JobNotFound(_) => ApiError::NotFound,
            Error::Upload { reason } => ApiError::Processing(reason),
            other => ApiError::Processing(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

pub async fn index_handler() -> Json<serde_json::Value> {
    Json(json!({ "message": "Financial Document Analyzer API is running" }))
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "jobs": state.jobs.counts(),
    }))
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub message: &'static str,
    pub status_url: String,
    pub query: String,
    pub job_id: String,
    pub file_processed: String,
}

/// Accepts `file` (required) and `query` (optional) form fields.
pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    mut form: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let mut upload: Option<UploadedDocument> = None;
    let mut query: Option<String> = None;

    while let Some(field) = form
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("document.pdf").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Processing(format!("cannot read upload: {}", e)))?;
                upload = Some(UploadedDocument::new(file_name, bytes));
            }
            Some("query") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("invalid query field: {}", e)))?;
                query = Some(text);
            }
            other => warn!(field = ?other, "ignoring unknown form field"),
        }
    }

    let upload = upload.ok_or_else(|| ApiError::BadRequest("field 'file' is required".into()))?;
    let submission = state.jobs.submit(upload, query.as_deref()).await?;
    info!(job_id = %submission.job_id, file = %submission.file_name, "analysis accepted");

    Ok(Json(AnalyzeResponse {
        message: "Document received and processing started",
        status_url: format!("/status/{}", submission.job_id),
        query: submission.query,
        job_id: submission.job_id.to_string(),
        file_processed: submission.file_name,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn status_handler(
    AxumPath(job_id): AxumPath<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let snapshot = state.jobs.status(&job_id)?;
    Ok(Json(StatusResponse {
        status: snapshot.status,
        result: snapshot.result,
        error: snapshot.error,
    }))
}
