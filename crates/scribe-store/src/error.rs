//! Store-specific error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during store operations.
///
/// Absent records are not errors; lookups return `Option`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database file {path} is not a valid document collection: {message}")]
    Corrupt { path: PathBuf, message: String },
}

impl From<StoreError> for scribe_types::ScribeError {
    fn from(e: StoreError) -> Self {
        scribe_types::ScribeError::Store(e.to_string())
    }
}
