//! Job manager - one isolated execution per uploaded document
//!
//! Submission stores the upload, registers the job as `pending`, and spawns
//! its run. The run moves the job to `processing`, drives the pipeline in
//! its own task so a panic cannot escape, releases the document, and then
//! records the terminal status.

use crate::orchestrator::{PipelineError, StageObserver};
use crate::store::DocumentStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fincrew_core::config::DEFAULT_QUERY;
use fincrew_core::{Error, JobId, JobSnapshot, JobStatus, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Everything one job's pipeline run may see.
pub struct JobContext {
    pub job_id: JobId,
    pub document_path: PathBuf,
    pub query: String,
    pub progress: Arc<dyn StageObserver>,
}

/// The work a job performs once its document is stored.
#[async_trait::async_trait]
pub trait JobPipeline: Send + Sync {
    async fn run(&self, job: JobContext) -> std::result::Result<String, PipelineError>;
}

#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub file_name: String,
    pub bytes: bytes::Bytes,
}

impl UploadedDocument {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<bytes::Bytes>) -> Self {
        Self { file_name: file_name.into(), bytes: bytes.into() }
    }
}

/// What the caller learns at submission time.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub job_id: JobId,
    pub query: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug)]
struct JobExecution {
    id: JobId,
    query: String,
    document: String,
    status: JobStatus,
    result: Option<String>,
    error: Option<String>,
    stages: BTreeMap<String, String>,
    stage_order: Vec<String>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl JobExecution {
    fn new(id: JobId, query: String, document: String) -> Self {
        Self {
            id,
            query,
            document,
            status: JobStatus::Pending,
            result: None,
            error: None,
            stages: BTreeMap::new(),
            stage_order: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            warn!(job_id = %self.id, from = %self.status, to = %next, "ignored status change");
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }

    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            status: self.status,
            query: self.query.clone(),
            document: self.document.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            stages: self.stages.clone(),
            stage_order: self.stage_order.clone(),
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }
}

type JobTable = Arc<DashMap<JobId, JobExecution>>;

/// Records stage results into the job's entry as they arrive.
struct JobProgress {
    jobs: JobTable,
    job_id: JobId,
}

impl StageObserver for JobProgress {
    fn stage_completed(&self, node_id: &str, text: &str) {
        if let Some(mut job) = self.jobs.get_mut(&self.job_id) {
            if !job.stages.contains_key(node_id) {
                job.stages.insert(node_id.to_string(), text.to_string());
                job.stage_order.push(node_id.to_string());
            }
        }
    }
}

pub struct JobManager {
    jobs: JobTable,
    pipeline: Arc<dyn JobPipeline>,
    store: Arc<dyn DocumentStore>,
    default_query: String,
}

impl JobManager {
    pub fn new(pipeline: Arc<dyn JobPipeline>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            pipeline,
            store,
            default_query: DEFAULT_QUERY.to_string(),
        }
    }

    pub fn with_default_query(mut self, query: impl Into<String>) -> Self {
        self.default_query = query.into();
        self
    }

    /// Store the upload, register a pending job, and start it. Returns at
    /// once; the pipeline runs in the background.
    pub async fn submit(&self, upload: UploadedDocument, query: Option<&str>) -> Result<Submission> {
        if upload.bytes.is_empty() {
            return Err(Error::upload("uploaded file is empty"));
        }
        let query = match query.map(str::trim) {
            Some(q) if !q.is_empty() => q.to_string(),
            _ => self.default_query.clone(),
        };

        let job_id = JobId::generate();
        let document_path = self.store.save(&job_id, &upload.bytes).await?;

        self.jobs.insert(
            job_id.clone(),
            JobExecution::new(job_id.clone(), query.clone(), upload.file_name.clone()),
        );
        info!(job_id = %job_id, file = %upload.file_name, "job_submitted");

        let ctx = JobContext {
            job_id: job_id.clone(),
            document_path,
            query: query.clone(),
            progress: Arc::new(JobProgress { jobs: Arc::clone(&self.jobs), job_id: job_id.clone() }),
        };
        tokio::spawn(drive(
            Arc::clone(&self.jobs),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.store),
            ctx,
        ));

        Ok(Submission { job_id, query, file_name: upload.file_name })
    }

    pub fn status(&self, job_id: &str) -> Result<JobSnapshot> {
        self.jobs
            .get(&JobId::new(job_id))
            .map(|job| job.snapshot())
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in self.jobs.iter() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Poll until the job reaches a terminal state or `timeout` passes.
    pub async fn wait_for(&self, job_id: &str, timeout: Duration) -> Result<JobSnapshot> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let snapshot = self.status(job_id)?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Internal(format!(
                    "job {} still {} after {:?}",
                    job_id, snapshot.status, timeout
                )));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn drive(
    jobs: JobTable,
    pipeline: Arc<dyn JobPipeline>,
    store: Arc<dyn DocumentStore>,
    ctx: JobContext,
) {
    let job_id = ctx.job_id.clone();
    let document_path = ctx.document_path.clone();

    if let Some(mut job) = jobs.get_mut(&job_id) {
        job.transition(JobStatus::Processing);
    }
    debug!(job_id = %job_id, "job_processing");

    let outcome = match tokio::spawn(async move { pipeline.run(ctx).await }).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(e.to_string()),
        Err(join_err) => {
            error!(job_id = %job_id, error = %join_err, "job_panicked");
            Err(format!("internal error: {}", join_err))
        }
    };

    if let Err(e) = store.release(&document_path).await {
        warn!(job_id = %job_id, path = %document_path.display(), error = %e, "document release failed");
    }

    let Some(mut job) = jobs.get_mut(&job_id) else { return };
    match outcome {
        Ok(text) => {
            job.result = Some(text);
            job.transition(JobStatus::Completed);
            info!(job_id = %job_id, "job_completed");
        }
        Err(cause) => {
            job.error = Some(cause.clone());
            job.transition(JobStatus::Failed);
            error!(job_id = %job_id, error = %cause, "job_failed");
        }
    }
}
