//! Pipeline error taxonomy.
//!
//! Scene-scoped failures are recorded as data in `SceneStageResult` and
//! never surface as errors from status queries; the variants here cover
//! job-scoped failures and caller mistakes.

use thiserror::Error;

use slidecast_media::MediaError;
use slidecast_models::Stage;
use slidecast_providers::ProviderError;
use slidecast_store::{PutError, StoreError};

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised by the scheduler and stage runner.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transient provider failure: {0}")]
    TransientProvider(String),

    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    #[error("stage {stage} failed for {failed} of {total} scenes")]
    PartialStageFailure {
        stage: Stage,
        failed: usize,
        total: usize,
    },

    #[error("no scene survived the pipeline")]
    AllScenesFailed,

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job cancelled")]
    Cancelled,

    #[error("{0}")]
    Fatal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// True if a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientProvider(_) | Self::ResourceExhaustion(_) | Self::Io(_)
        )
    }
}

impl From<validator::ValidationErrors> for PipelineError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<ProviderError> for PipelineError {
    fn from(e: ProviderError) -> Self {
        if e.is_transient() {
            Self::TransientProvider(e.to_string())
        } else {
            Self::Fatal(e.to_string())
        }
    }
}

impl From<MediaError> for PipelineError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::Cancelled => Self::Cancelled,
            e if e.is_transient() => Self::TransientProvider(e.to_string()),
            e => Self::Fatal(e.to_string()),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        Self::Fatal(e.to_string())
    }
}

impl From<PutError<ProviderError>> for PipelineError {
    fn from(e: PutError<ProviderError>) -> Self {
        match e {
            PutError::Store(e) => e.into(),
            PutError::Producer(e) => e.into(),
        }
    }
}
