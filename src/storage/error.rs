//! Storage layer errors.

use std::path::PathBuf;

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No data file exists for the requested database.
    #[error("database \"{0}\" does not exist")]
    NotFound(String),

    /// The data file exists but does not have the expected shape.
    #[error("invalid data file {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    /// The data file is not valid JSON.
    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// I/O error from underlying file system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
