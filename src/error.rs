use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Write job failed: {0}")]
    JobExecution(#[source] anyhow::Error),
    #[error("Maintenance error: {0}")]
    Maintenance(String),
    #[error("Snapshot export to {} failed: {}", .path.display(), .reason)]
    Export { path: PathBuf, reason: String },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn export(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StoreError::Export {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
