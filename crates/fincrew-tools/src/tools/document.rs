//! Job-scoped document text
//!
//! Text is extracted once per job, on first use, and shared by every
//! document tool bound to that job.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum DocumentError {
    #[error("cannot read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("cannot extract PDF text: {0}")]
    Pdf(String),

    #[error("document contains no extractable text")]
    Empty,
}

pub struct JobDocument {
    path: PathBuf,
    text: OnceCell<Result<Arc<str>, DocumentError>>,
}

impl JobDocument {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), text: OnceCell::new() }
    }

    /// Wrap already-extracted text. No file is touched.
    pub fn from_text(text: impl Into<String>) -> Self {
        let cell = OnceCell::new();
        let normalized = normalize_text(&text.into());
        let value = if normalized.is_empty() {
            Err(DocumentError::Empty)
        } else {
            Ok(Arc::from(normalized))
        };
        let _ = cell.set(value);
        Self { path: PathBuf::new(), text: cell }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Normalized document text, loading it on first call.
    pub async fn text(&self) -> Result<Arc<str>, DocumentError> {
        self.text
            .get_or_init(|| async { load_text(&self.path).await })
            .await
            .clone()
    }
}

async fn load_text(path: &Path) -> Result<Arc<str>, DocumentError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| DocumentError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let raw = if bytes.starts_with(b"%PDF") {
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| DocumentError::Pdf(e.to_string()))?
            .map_err(|e| DocumentError::Pdf(e.to_string()))?
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };

    let text = normalize_text(&raw);
    if text.is_empty() {
        warn!(path = %path.display(), "document has no text");
        return Err(DocumentError::Empty);
    }
    debug!(path = %path.display(), chars = text.len(), "document text loaded");
    Ok(Arc::from(text))
}

/// Collapse runs of whitespace inside each line and drop blank lines.
pub fn normalize_text(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cut text to at most `max` chars on a char boundary, marking the cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}\n[truncated]", cut)
}
