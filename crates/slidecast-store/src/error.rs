//! Error types for the artifact store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the artifact store itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Producer completed without writing {0}")]
    MissingOutput(std::path::PathBuf),

    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),
}

/// Outcome of a `put_with` call: either the store failed, or the caller's
/// producer did. Producer errors pass through untouched so the caller
/// keeps its own error taxonomy (e.g. transient vs permanent).
#[derive(Debug, Error)]
pub enum PutError<E> {
    #[error(transparent)]
    Store(StoreError),

    #[error("artifact producer failed")]
    Producer(#[source] E),
}

impl<E> From<StoreError> for PutError<E> {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
