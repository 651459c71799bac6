//! Provider error types.
//!
//! Providers must report failures with a transient-vs-permanent
//! distinction: transient failures (network, rate limits, timeouts) are
//! retried and may trigger a fallback engine; permanent failures are not.

use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Retryable failure: network hiccup, rate limit, busy engine.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Non-retryable failure: bad input, unsupported voice, missing engine.
    #[error("permanent provider failure: {0}")]
    Permanent(String),

    /// Provider call exceeded its hard timeout. Treated as transient.
    #[error("provider call timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Whether retrying (or falling back) can help.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient(_) | ProviderError::Timeout(_) | ProviderError::Io(_)
        )
    }
}
