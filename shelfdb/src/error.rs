use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Timed out after {waited_ms}ms waiting for write lock on {}", .path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("Validation error in {}: {message}", .path.display())]
    Validation { path: PathBuf, message: String },

    #[error("Unknown document: {0}")]
    UnknownDocument(String),

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Whether retrying the same operation later may succeed.
    /// Only lock contention qualifies; everything else needs a fix first.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::LockTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
