//! Error types for Hoverfetch

use thiserror::Error;

/// Errors that can occur while predicting and dispatching speculative work
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown mode: {0}")]
    InvalidMode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Host rejected instruction: {0}")]
    HostError(String),

    #[error("Trust resolution failed: {0}")]
    TrustError(String),
}
