//! Shared data models for the Slidecast pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Projects, scenes and style defaults
//! - Jobs, pipeline stages and per-scene stage results
//! - Output quality presets and encoding configuration
//! - Artifact naming conventions

pub mod encoding;
pub mod job;
pub mod naming;
pub mod project;
pub mod scene;

// Re-export common types
pub use encoding::{EncodingConfig, QualityPreset};
pub use job::{
    Job, JobError, JobId, JobSnapshot, JobState, SceneStageResult, Stage, StageStatus,
};
pub use naming::{final_video_name, narration_file_name, segment_file_name};
pub use project::{Project, ProjectId, StyleDefaults, StylePreset};
pub use scene::{AssetRef, Scene, VoiceSpec};
