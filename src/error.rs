//! Error types for pminmax.

use thiserror::Error;

/// Main error type for pminmax.
///
/// Everything here is fatal to a run. Per-partition channel failures are
/// absorbed by the aggregator and never surface as an `EngineError`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Resource setup failed: {0}")]
    Resource(String),

    #[error("Failed to spawn worker for partition {partition}: {source}")]
    Spawn {
        partition: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for pminmax operations.
pub type Result<T> = std::result::Result<T, EngineError>;
