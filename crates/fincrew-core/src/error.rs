//! Error types for Fincrew

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("upload error: {reason}")]
    Upload { reason: String },

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn upload(reason: impl Into<String>) -> Self {
        Self::Upload {
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::JobNotFound(_))
    }
}
