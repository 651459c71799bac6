//! Job records, the pipeline state machine and per-scene stage results.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::project::ProjectId;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline state of a job.
///
/// Transitions are one-directional along the pipeline; `Failed` and
/// `Cancelled` are reachable from any non-terminal state. No stage is
/// re-entered except via retry within the same stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a worker slot
    #[default]
    Queued,
    /// Extracting text from source documents
    Extracting,
    /// Synthesizing per-scene narration
    Narrating,
    /// Rendering per-scene video segments
    Rendering,
    /// Joining segments with transitions
    Concatenating,
    /// Re-encoding to the output preset
    Exporting,
    /// Final video available
    Completed,
    /// Job failed with a structured error
    Failed,
    /// Job cancelled by the caller
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Extracting => "extracting",
            JobState::Narrating => "narrating",
            JobState::Rendering => "rendering",
            JobState::Concatenating => "concatenating",
            JobState::Exporting => "exporting",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Position in the forward pipeline, used to enforce one-directional flow.
    fn pipeline_rank(&self) -> Option<u8> {
        match self {
            JobState::Queued => Some(0),
            JobState::Extracting => Some(1),
            JobState::Narrating => Some(2),
            JobState::Rendering => Some(3),
            JobState::Concatenating => Some(4),
            JobState::Exporting => Some(5),
            JobState::Completed => Some(6),
            JobState::Failed | JobState::Cancelled => None,
        }
    }

    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobState::Failed | JobState::Cancelled => true,
            _ => match (self.pipeline_rank(), next.pipeline_rank()) {
                (Some(from), Some(to)) => to == from + 1,
                _ => false,
            },
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One pipeline phase.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Narrate,
    Render,
    Concatenate,
    Export,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Narrate => "narrate",
            Stage::Render => "render",
            Stage::Concatenate => "concatenate",
            Stage::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of one stage for one scene.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Output served from the artifact cache without recomputation
    SkippedCached,
}

impl StageStatus {
    /// True once the stage can make no further progress for this scene.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Succeeded | StageStatus::Failed | StageStatus::SkippedCached
        )
    }

    /// True if the stage produced a usable artifact.
    pub fn is_success(&self) -> bool {
        matches!(self, StageStatus::Succeeded | StageStatus::SkippedCached)
    }
}

/// Per-scene record of a stage execution.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SceneStageResult {
    /// Scene order index this result belongs to
    pub scene_index: u32,

    /// Which stage ran
    pub stage: Stage,

    /// Outcome
    pub status: StageStatus,

    /// Fingerprint of the produced (or reused) artifact, hex-encoded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,

    /// Error message when `status` is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SceneStageResult {
    /// Create a pending result.
    pub fn pending(scene_index: u32, stage: Stage) -> Self {
        Self {
            scene_index,
            stage,
            status: StageStatus::Pending,
            fingerprint: None,
            error: None,
        }
    }
}

/// Structured error attached to a failed job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    /// Stage that failed
    pub stage: Stage,

    /// Scene index when the failure was scene-scoped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_index: Option<u32>,

    /// Human-readable message
    pub message: String,
}

impl JobError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            scene_index: None,
            message: message.into(),
        }
    }

    pub fn for_scene(stage: Stage, scene_index: u32, message: impl Into<String>) -> Self {
        Self {
            stage,
            scene_index: Some(scene_index),
            message: message.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scene_index {
            Some(idx) => write!(f, "{} (scene {}): {}", self.stage, idx, self.message),
            None => write!(f, "{}: {}", self.stage, self.message),
        }
    }
}

/// Durable record of one end-to-end pipeline run.
///
/// Owned exclusively by the scheduler's driver task for the job; all
/// mutation goes through the transition helpers below so `updated_at`
/// stays accurate and illegal transitions are rejected.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Project this job renders
    pub project_id: ProjectId,

    /// Current pipeline state
    #[serde(default)]
    pub state: JobState,

    /// Number of scenes in the project snapshot
    pub scene_count: u32,

    /// Per-scene stage results, appended as stages run
    #[serde(default)]
    pub stage_results: Vec<SceneStageResult>,

    /// Scene indices excluded from the final video after permanent failure
    #[serde(default)]
    pub dropped_scenes: Vec<u32>,

    /// Structured error when `state` is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Path of the exported final video once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,

    /// Cooperative cancellation flag, observed at stage checkpoints
    #[serde(default)]
    pub cancel_requested: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Completed at timestamp (any terminal state)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job for a project.
    pub fn new(project_id: ProjectId, scene_count: u32) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            project_id,
            state: JobState::Queued,
            scene_count,
            stage_results: Vec::new(),
            dropped_scenes: Vec::new(),
            error: None,
            result_path: None,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Advance to the next pipeline state.
    ///
    /// Returns `false` (leaving the job untouched) when the transition is
    /// illegal, e.g. after a terminal state was reached.
    pub fn transition_to(&mut self, next: JobState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        if self.started_at.is_none() && next != JobState::Queued {
            self.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.state = next;
        self.updated_at = Utc::now();
        true
    }

    /// Record a stage result, replacing any earlier record for the same
    /// (scene, stage) pair.
    pub fn record_stage(&mut self, result: SceneStageResult) {
        self.stage_results
            .retain(|r| !(r.scene_index == result.scene_index && r.stage == result.stage));
        self.stage_results.push(result);
        self.updated_at = Utc::now();
    }

    /// Mark the job failed with a structured error.
    pub fn fail(&mut self, error: JobError) -> bool {
        if !self.transition_to(JobState::Failed) {
            return false;
        }
        self.error = Some(error);
        true
    }

    /// Mark the job cancelled.
    pub fn cancel(&mut self) -> bool {
        self.transition_to(JobState::Cancelled)
    }

    /// Record a dropped scene (degraded output).
    pub fn drop_scene(&mut self, scene_index: u32) {
        if !self.dropped_scenes.contains(&scene_index) {
            self.dropped_scenes.push(scene_index);
            self.dropped_scenes.sort_unstable();
        }
        self.updated_at = Utc::now();
    }

    /// Overall progress percentage.
    ///
    /// Stage-units: narrate + render per scene, plus extract, concatenate
    /// and export. Cached skips count as completed units.
    pub fn progress_percent(&self) -> u8 {
        if self.state == JobState::Completed {
            return 100;
        }
        let total = (self.scene_count as usize) * 2 + 3;
        let mut done = self
            .stage_results
            .iter()
            .filter(|r| r.status.is_terminal())
            .count();
        // Global stages are not tracked per scene; infer from state.
        if self.state.pipeline_rank().unwrap_or(0) > JobState::Extracting.pipeline_rank().unwrap()
        {
            done += 1; // extract finished
        }
        if self.state == JobState::Exporting {
            done += 1; // concatenate finished
        }
        (((done.min(total)) * 100) / total) as u8
    }

    /// Point-in-time snapshot for status queries.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            project_id: self.project_id.clone(),
            state: self.state,
            progress: self.progress_percent(),
            stage_results: self.stage_results.clone(),
            dropped_scenes: self.dropped_scenes.clone(),
            error: self.error.clone(),
            result_path: self.result_path.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Coherent point-in-time view of a job, returned by status queries.
///
/// Failure is data here: snapshots for failed jobs carry the structured
/// error instead of surfacing it as an API-level error.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub project_id: ProjectId,
    pub state: JobState,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub stage_results: Vec<SceneStageResult>,
    pub dropped_scenes: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let mut job = Job::new(ProjectId::new(), 3);
        for next in [
            JobState::Extracting,
            JobState::Narrating,
            JobState::Rendering,
            JobState::Concatenating,
            JobState::Exporting,
            JobState::Completed,
        ] {
            assert!(job.transition_to(next), "transition to {next} should succeed");
        }
        assert!(job.state.is_terminal());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_no_stage_skipping() {
        let mut job = Job::new(ProjectId::new(), 1);
        assert!(!job.transition_to(JobState::Rendering));
        assert_eq!(job.state, JobState::Queued);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = Job::new(ProjectId::new(), 1);
        assert!(job.cancel());
        assert!(!job.transition_to(JobState::Extracting));
        assert!(!job.fail(JobError::new(Stage::Extract, "late failure")));
        assert_eq!(job.state, JobState::Cancelled);
    }

    #[test]
    fn test_fail_from_any_nonterminal_state() {
        for state in [JobState::Queued, JobState::Narrating, JobState::Exporting] {
            assert!(state.can_transition_to(JobState::Failed));
            assert!(state.can_transition_to(JobState::Cancelled));
        }
        assert!(!JobState::Completed.can_transition_to(JobState::Failed));
    }

    #[test]
    fn test_record_stage_replaces_previous() {
        let mut job = Job::new(ProjectId::new(), 1);
        job.record_stage(SceneStageResult::pending(0, Stage::Narrate));
        job.record_stage(SceneStageResult {
            status: StageStatus::Succeeded,
            ..SceneStageResult::pending(0, Stage::Narrate)
        });
        assert_eq!(job.stage_results.len(), 1);
        assert_eq!(job.stage_results[0].status, StageStatus::Succeeded);
    }

    #[test]
    fn test_progress_percent() {
        let mut job = Job::new(ProjectId::new(), 3);
        assert_eq!(job.progress_percent(), 0);

        // 3 scenes -> 9 units total; two narrations done
        for idx in 0..2 {
            job.record_stage(SceneStageResult {
                status: StageStatus::Succeeded,
                ..SceneStageResult::pending(idx, Stage::Narrate)
            });
        }
        assert_eq!(job.progress_percent() as u32, 2 * 100 / 9);

        job.transition_to(JobState::Extracting);
        job.transition_to(JobState::Narrating);
        assert_eq!(job.progress_percent() as u32, 3 * 100 / 9);
    }

    #[test]
    fn test_dropped_scenes_sorted_unique() {
        let mut job = Job::new(ProjectId::new(), 3);
        job.drop_scene(2);
        job.drop_scene(0);
        job.drop_scene(2);
        assert_eq!(job.dropped_scenes, vec![0, 2]);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut job = Job::new(ProjectId::new(), 2);
        job.fail(JobError::for_scene(Stage::Render, 1, "encoder crashed"));

        let snapshot = job.snapshot();
        let json = serde_json::to_string(&snapshot).expect("serialize snapshot");
        let decoded: JobSnapshot = serde_json::from_str(&json).expect("deserialize snapshot");
        assert_eq!(decoded.state, JobState::Failed);
        assert_eq!(decoded.error.unwrap().scene_index, Some(1));
    }
}
