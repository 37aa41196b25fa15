//! Error types for the deployment control core

use thiserror::Error;

/// Main error type for the control core
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive corrupt: {0}")]
    ArchiveCorrupt(String),

    #[error("Size limit exceeded: {0}")]
    SizeLimitExceeded(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Circuit open for app {0}")]
    CircuitOpen(String),

    #[error("No database provisioned for app {0}")]
    NoDatabaseProvisioned(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Seed failed: {0}")]
    SeedFailed(String),

    #[error("Git host error ({status}): {body}")]
    GitHost { status: u16, body: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ControlError {
    fn from(err: anyhow::Error) -> Self {
        ControlError::Internal(err.to_string())
    }
}
