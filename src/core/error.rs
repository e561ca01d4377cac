//! Error types for volbrick

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Volume error: {0}")]
    Volume(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Streaming error: {0}")]
    Streaming(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage budget exceeded: requested {requested} bytes, {available} available")]
    BudgetExceeded { requested: usize, available: usize },
}
