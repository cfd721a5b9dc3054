//! Error types for codec and pipeline operations.

use thiserror::Error;

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Codec and pipeline error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialized codec data is corrupted or truncated.
    #[error("corrupted data: {0}")]
    Corrupted(String),

    /// A codec was used before `build` or before its tables were loaded.
    #[error("codec not built: {0}")]
    NotBuilt(&'static str),

    /// A record in the dataset could not be parsed.
    #[error("malformed record at sample {index}: {message}")]
    MalformedRecord { index: usize, message: String },

    /// A record field had the wrong variant for the configured codec.
    #[error("field {field} is not a bytes field")]
    FieldType { field: usize },

    /// I/O error from an underlying file or stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Worker pool construction or execution failed.
    #[error("worker error: {0}")]
    Worker(String),
}

impl Error {
    /// Create a corrupted-data error from any displayable message.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Error::Corrupted(message.into())
    }

    /// Create a worker error from any displayable message.
    pub fn worker(message: impl Into<String>) -> Self {
        Error::Worker(message.into())
    }
}
