//! Error types for e2ebench
//!
//! Only systems failures surface as errors. Data-quality problems (empty
//! runs, missing samples, non-finite values) are reported as undefined
//! metrics by the aggregator instead.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// e2ebench error types
#[derive(Error, Debug)]
pub enum Error {
    /// A sample was recorded while no run was active
    #[error("No active run: call Recorder::start_run() before recording samples")]
    NoActiveRun,

    /// A run was started while another one is still open
    #[error("Run '{0}' is still active: finish() or abort() it before starting a new run")]
    RunAlreadyActive(String),

    /// Invalid argument or configuration value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Sink or archive error
    #[error("Storage error: {0}")]
    StorageError(String),

    /// JSON encoding/decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
