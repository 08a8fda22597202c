//! Temporary document storage, one file per job

use fincrew_core::{Error, JobId, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist an upload for `job_id` and return where it lives.
    async fn save(&self, job_id: &JobId, bytes: &[u8]) -> Result<PathBuf>;

    /// Remove a stored document. Missing files are not an error.
    async fn release(&self, path: &Path) -> Result<()>;
}

/// Files under a data directory named `financial_document_<job_id>.pdf`.
pub struct FsDocumentStore {
    dir: PathBuf,
}

impl FsDocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, job_id: &JobId) -> PathBuf {
        self.dir.join(format!("financial_document_{}.pdf", job_id))
    }
}

#[async_trait::async_trait]
impl DocumentStore for FsDocumentStore {
    async fn save(&self, job_id: &JobId, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::upload(format!("cannot create {}: {}", self.dir.display(), e)))?;
        let path = self.path_for(job_id);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::upload(format!("cannot write {}: {}", path.display(), e)))?;
        debug!(job_id = %job_id, path = %path.display(), bytes = bytes.len(), "document stored");
        Ok(path)
    }

    async fn release(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "document released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
