//! Pipeline orchestrator: job scheduling, stage execution, retry,
//! durable job records and progress events.
//!
//! The pipeline turns a project (or a source document) into a final
//! video through five stages: extract, narrate, render, concatenate,
//! export. Scene-scoped stages run in parallel and are cached by
//! content fingerprint; a scene that fails permanently is dropped and
//! the job completes degraded rather than failing outright.

pub mod config;
pub mod error;
pub mod job_store;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod scheduler;
pub mod stages;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use job_store::JobStore;
pub use progress::{ProgressChannel, ProgressUpdate};
pub use retry::{retry_async, retry_async_if, RetryConfig, RetryResult};
pub use scheduler::JobScheduler;
pub use stages::{StageOutput, StageRunner};
