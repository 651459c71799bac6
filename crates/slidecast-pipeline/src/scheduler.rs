//! Job scheduler: bounded worker pool, per-job drivers, cancellation.
//!
//! Each submitted job gets a driver task that owns its `Job` record
//! exclusively; per-scene work fans out through a `JoinSet` bounded by a
//! scene semaphore and reports results back to the driver, so the record
//! is only ever mutated from one task.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use slidecast_models::{
    Job, JobError, JobId, JobSnapshot, JobState, Project, Scene, SceneStageResult, Stage,
    StageStatus, StyleDefaults,
};
use slidecast_store::Artifact;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::job_store::JobStore;
use crate::logging::JobLogger;
use crate::progress::{ProgressChannel, ProgressUpdate};
use crate::stages::{StageOutput, StageRunner};

/// Where a job's scenes come from.
enum JobSource {
    /// Scenes authored directly in the submitted project
    Inline(Project),
    /// Scenes extracted from a document at pipeline time
    Document { path: PathBuf, style: StyleDefaults },
}

struct SchedulerInner {
    config: PipelineConfig,
    runner: StageRunner,
    jobs: JobStore,
    progress: ProgressChannel,
    job_slots: Semaphore,
    cancels: Mutex<HashMap<String, watch::Sender<bool>>>,
}

/// Public entry point: submit, status, cancel, result.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
}

impl JobScheduler {
    pub fn new(runner: StageRunner, jobs: JobStore, config: PipelineConfig) -> Self {
        let job_slots = Semaphore::new(config.max_concurrent_jobs);
        let scheduler = Self {
            inner: Arc::new(SchedulerInner {
                config,
                runner,
                jobs,
                progress: ProgressChannel::default(),
                job_slots,
                cancels: Mutex::new(HashMap::new()),
            }),
        };

        // Records reloaded in a non-terminal state have no driver in
        // this process and can never advance on their own.
        let sweeper = scheduler.clone();
        tokio::spawn(async move {
            sweeper.fail_interrupted_jobs().await;
        });

        scheduler
    }

    /// Fail every reloaded job whose driver died with a previous
    /// process. Jobs with a live driver in this process are skipped.
    async fn fail_interrupted_jobs(&self) {
        for snapshot in self.inner.jobs.list().await {
            if snapshot.state.is_terminal() {
                continue;
            }
            if self
                .inner
                .cancels
                .lock()
                .await
                .contains_key(snapshot.job_id.as_str())
            {
                continue;
            }
            let Some(mut job) = self.inner.jobs.get(&snapshot.job_id).await else {
                continue;
            };

            warn!(
                job_id = %job.id,
                state = %job.state,
                "Failing job interrupted by a previous run"
            );
            job.fail(JobError::new(
                interrupted_stage(job.state),
                "interrupted by worker restart",
            ));
            if let Err(e) = self.inner.jobs.save(&job).await {
                warn!(job_id = %job.id, error = %e, "Could not persist interrupted job");
                continue;
            }
            counter!("slidecast_jobs_failed_total").increment(1);
            self.inner.progress.publish(ProgressUpdate::new(
                job.id.clone(),
                JobState::Failed,
                job.progress_percent(),
            ));
        }
    }

    /// Submit a project for rendering. Validation failures reject the
    /// submission without creating a job.
    pub async fn submit(&self, project: Project) -> PipelineResult<JobId> {
        project.validate()?;
        let scene_count = project.scenes.len() as u32;
        self.enqueue(project.id.clone(), scene_count, JobSource::Inline(project))
            .await
    }

    /// Submit a document for extraction and rendering. Extraction runs
    /// inside the job, so an unreadable document fails the job rather
    /// than the submission.
    pub async fn submit_document(
        &self,
        path: PathBuf,
        style: StyleDefaults,
    ) -> PipelineResult<JobId> {
        let project_id = slidecast_models::ProjectId::new();
        self.enqueue(project_id, 0, JobSource::Document { path, style })
            .await
    }

    async fn enqueue(
        &self,
        project_id: slidecast_models::ProjectId,
        scene_count: u32,
        source: JobSource,
    ) -> PipelineResult<JobId> {
        let job = Job::new(project_id, scene_count);
        let job_id = job.id.clone();

        // Register the driver before the record hits disk so the
        // interrupted-job sweep never mistakes a fresh job for an orphan
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.inner
            .cancels
            .lock()
            .await
            .insert(job_id.to_string(), cancel_tx);
        if let Err(e) = self.inner.jobs.save(&job).await {
            self.inner.cancels.lock().await.remove(job_id.as_str());
            return Err(e);
        }

        counter!("slidecast_jobs_submitted_total").increment(1);
        self.inner.progress.publish(ProgressUpdate::new(
            job_id.clone(),
            JobState::Queued,
            0,
        ));

        let inner = self.inner.clone();
        let driver_job_id = job_id.clone();
        tokio::spawn(async move {
            drive_job(inner, driver_job_id, source, cancel_rx).await;
        });

        info!(job_id = %job_id, "Job submitted");
        Ok(job_id)
    }

    /// Point-in-time status. Failed jobs return a snapshot carrying the
    /// structured error; only unknown IDs are an error here.
    pub async fn status(&self, job_id: &JobId) -> PipelineResult<JobSnapshot> {
        self.inner
            .jobs
            .get(job_id)
            .await
            .map(|job| job.snapshot())
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))
    }

    /// Request cooperative cancellation. Already-terminal jobs are left
    /// untouched.
    ///
    /// Only the watch flag is raised here; the record itself belongs to
    /// the driver task, which persists the cancellation at its next
    /// checkpoint.
    pub async fn cancel(&self, job_id: &JobId) -> PipelineResult<()> {
        let job = self
            .inner
            .jobs
            .get(job_id)
            .await
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;

        if job.state.is_terminal() {
            return Ok(());
        }

        if let Some(cancel_tx) = self.inner.cancels.lock().await.get(job_id.as_str()) {
            let _ = cancel_tx.send(true);
        }
        info!(job_id = %job_id, "Cancellation requested");
        Ok(())
    }

    /// Final video path once the job completed.
    pub async fn result(&self, job_id: &JobId) -> PipelineResult<Option<PathBuf>> {
        let snapshot = self.status(job_id).await?;
        Ok(snapshot.result_path.map(PathBuf::from))
    }

    /// Subscribe to progress events for all jobs.
    pub fn subscribe_progress(&self) -> tokio::sync::broadcast::Receiver<ProgressUpdate> {
        self.inner.progress.subscribe()
    }

    /// Snapshots of all known jobs.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        self.inner.jobs.list().await
    }

    /// One maintenance pass: evict stale artifacts and expired job
    /// records.
    pub async fn run_maintenance(&self) -> PipelineResult<()> {
        self.inner
            .runner
            .store()
            .purge(
                self.inner.config.artifact_max_age,
                self.inner.config.artifact_max_bytes,
            )
            .await?;
        self.inner
            .jobs
            .purge_terminal(self.inner.config.job_retention)
            .await?;
        Ok(())
    }
}

/// Per-scene result reported back to the driver.
type SceneResult = (u32, Result<StageOutput, PipelineError>);

async fn drive_job(
    inner: Arc<SchedulerInner>,
    job_id: JobId,
    source: JobSource,
    cancel_rx: watch::Receiver<bool>,
) {
    let started = Instant::now();
    let outcome = run_pipeline(&inner, &job_id, source, &cancel_rx).await;

    match &outcome {
        Ok(state) => {
            counter!("slidecast_jobs_completed_total", "state" => state.as_str()).increment(1);
        }
        Err(e) => {
            counter!("slidecast_jobs_failed_total").increment(1);
            warn!(job_id = %job_id, error = %e, "Job driver finished with error");
        }
    }
    histogram!("slidecast_job_duration_seconds").record(started.elapsed().as_secs_f64());

    inner.cancels.lock().await.remove(job_id.as_str());
}

/// Run the full pipeline for one job. Returns the terminal state
/// reached; the error branch covers store failures that prevented even
/// recording an outcome.
async fn run_pipeline(
    inner: &Arc<SchedulerInner>,
    job_id: &JobId,
    source: JobSource,
    cancel_rx: &watch::Receiver<bool>,
) -> PipelineResult<JobState> {
    // Waiting for a slot keeps the job Queued instead of failing it.
    let _slot = inner
        .job_slots
        .acquire()
        .await
        .map_err(|_| PipelineError::ResourceExhaustion("scheduler shut down".into()))?;

    let mut job = inner
        .jobs
        .get(job_id)
        .await
        .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;
    let logger = JobLogger::new(job_id, Stage::Extract.as_str());

    if check_cancel(inner, &mut job, cancel_rx).await? {
        return Ok(JobState::Cancelled);
    }

    // EXTRACT
    advance(inner, &mut job, JobState::Extracting).await?;
    logger.log_start("resolving project scenes");

    let project = match resolve_project(inner, source).await {
        Ok(project) => project,
        Err(e) => return fail_job(inner, &mut job, JobError::new(Stage::Extract, e.to_string())).await,
    };
    job.scene_count = project.scenes.len() as u32;
    inner.jobs.save(&job).await?;

    let work_dir = inner.config.work_dir.join(job_id.as_str());
    tokio::fs::create_dir_all(&work_dir).await?;

    if check_cancel(inner, &mut job, cancel_rx).await? {
        return Ok(JobState::Cancelled);
    }

    // NARRATE
    advance(inner, &mut job, JobState::Narrating).await?;
    logger
        .for_stage(Stage::Narrate.as_str())
        .log_start(&format!("{} scenes", job.scene_count));
    let scenes: Vec<Scene> = project.ordered_scenes().into_iter().cloned().collect();
    let narrations = narrate_scenes(inner, &mut job, &project, &scenes, &work_dir, cancel_rx).await?;

    if check_cancel(inner, &mut job, cancel_rx).await? {
        return Ok(JobState::Cancelled);
    }

    // RENDER
    advance(inner, &mut job, JobState::Rendering).await?;
    logger
        .for_stage(Stage::Render.as_str())
        .log_start(&format!("{} surviving scenes", scenes.len() - job.dropped_scenes.len()));
    let segments =
        render_scenes(inner, &mut job, &project, &scenes, &narrations, cancel_rx).await?;

    if segments.is_empty() {
        return fail_job(
            inner,
            &mut job,
            JobError::new(Stage::Render, PipelineError::AllScenesFailed.to_string()),
        )
        .await;
    }

    if check_cancel(inner, &mut job, cancel_rx).await? {
        return Ok(JobState::Cancelled);
    }

    // CONCATENATE
    advance(inner, &mut job, JobState::Concatenating).await?;
    logger
        .for_stage(Stage::Concatenate.as_str())
        .log_start(&format!("{} segments", segments.len()));
    let joined = match inner.runner.run_concatenate(&segments, &work_dir).await {
        Ok(path) => path,
        Err(e) => {
            return fail_job(inner, &mut job, JobError::new(Stage::Concatenate, e.to_string()))
                .await
        }
    };

    if check_cancel(inner, &mut job, cancel_rx).await? {
        return Ok(JobState::Cancelled);
    }

    // EXPORT
    advance(inner, &mut job, JobState::Exporting).await?;
    logger
        .for_stage(Stage::Export.as_str())
        .log_start("final encode");
    let job_uuid = Uuid::parse_str(job_id.as_str()).unwrap_or_else(|_| Uuid::new_v4());
    let published = match inner.runner.run_export(&joined, &segments, &job_uuid).await {
        Ok((_, published)) => published,
        Err(e) => {
            return fail_job(inner, &mut job, JobError::new(Stage::Export, e.to_string())).await
        }
    };

    job.result_path = Some(published.to_string_lossy().to_string());
    advance(inner, &mut job, JobState::Completed).await?;
    logger.log_completion(&format!(
        "final video at {} ({} scenes, {} dropped)",
        published.display(),
        job.scene_count,
        job.dropped_scenes.len()
    ));

    // Scratch files are no longer needed; cached artifacts remain.
    let _ = tokio::fs::remove_dir_all(&work_dir).await;

    Ok(JobState::Completed)
}

async fn resolve_project(inner: &Arc<SchedulerInner>, source: JobSource) -> PipelineResult<Project> {
    match source {
        JobSource::Inline(project) => Ok(project),
        JobSource::Document { path, style } => {
            let scenes = inner.runner.run_extraction(&path).await?;
            let project = Project::new(scenes).with_style(style);
            project.validate()?;
            Ok(project)
        }
    }
}

/// Fan scene narration out across the scene pool. Scenes without text
/// are silent by design and skip narration entirely.
async fn narrate_scenes(
    inner: &Arc<SchedulerInner>,
    job: &mut Job,
    project: &Project,
    scenes: &[Scene],
    work_dir: &std::path::Path,
    cancel_rx: &watch::Receiver<bool>,
) -> PipelineResult<HashMap<u32, Artifact>> {
    let scene_slots = Arc::new(Semaphore::new(inner.config.max_scene_parallel));
    let mut tasks: JoinSet<SceneResult> = JoinSet::new();

    for scene in scenes.iter().filter(|s| s.has_text()).cloned() {
        let inner = inner.clone();
        let slots = scene_slots.clone();
        let voice = project.style.voice.clone();
        let work_dir = work_dir.to_path_buf();
        let cancel_rx = cancel_rx.clone();

        tasks.spawn(async move {
            let index = scene.order_index;
            let _permit = match slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (index, Err(PipelineError::Cancelled)),
            };
            if *cancel_rx.borrow() {
                return (index, Err(PipelineError::Cancelled));
            }
            let result = inner.runner.run_narration(&scene, &voice, &work_dir).await;
            (index, result)
        });
    }

    let mut narrations = HashMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.map_err(|e| PipelineError::fatal(e.to_string()))?;
        match result {
            Ok(output) => {
                job.record_stage(SceneStageResult {
                    scene_index: index,
                    stage: Stage::Narrate,
                    status: output.status,
                    fingerprint: Some(output.fingerprint().to_string()),
                    error: None,
                });
                publish_scene_progress(inner, job, index);
                narrations.insert(index, output.artifact);
            }
            Err(PipelineError::Cancelled) => {}
            Err(e) => {
                // Narration failure drops the scene; the job degrades
                // instead of failing.
                job.record_stage(SceneStageResult {
                    scene_index: index,
                    stage: Stage::Narrate,
                    status: StageStatus::Failed,
                    fingerprint: None,
                    error: Some(e.to_string()),
                });
                job.drop_scene(index);
                warn!(job_id = %job.id, scene = index, error = %e, "Scene narration failed, dropping scene");
            }
        }
    }
    inner.jobs.save(job).await?;
    Ok(narrations)
}

/// Render every scene that still has a future in the final video:
/// narrated scenes plus silent ones, minus dropped scenes. Returns
/// surviving segments in ascending scene order.
async fn render_scenes(
    inner: &Arc<SchedulerInner>,
    job: &mut Job,
    project: &Project,
    scenes: &[Scene],
    narrations: &HashMap<u32, Artifact>,
    cancel_rx: &watch::Receiver<bool>,
) -> PipelineResult<Vec<Artifact>> {
    let scene_slots = Arc::new(Semaphore::new(inner.config.max_scene_parallel));
    let mut tasks: JoinSet<SceneResult> = JoinSet::new();

    for scene in scenes.iter().cloned() {
        if job.dropped_scenes.contains(&scene.order_index) {
            continue;
        }
        let inner = inner.clone();
        let slots = scene_slots.clone();
        let preset = project.preset_for(&scene);
        let style = project.style.clone();
        let narration = narrations.get(&scene.order_index).cloned();
        let cancel_rx = cancel_rx.clone();

        tasks.spawn(async move {
            let index = scene.order_index;
            let _permit = match slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (index, Err(PipelineError::Cancelled)),
            };
            if *cancel_rx.borrow() {
                return (index, Err(PipelineError::Cancelled));
            }
            let result = inner
                .runner
                .run_render(&scene, preset, &style, narration.as_ref())
                .await;
            (index, result)
        });
    }

    let mut segments: Vec<(u32, Artifact)> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.map_err(|e| PipelineError::fatal(e.to_string()))?;
        match result {
            Ok(output) => {
                job.record_stage(SceneStageResult {
                    scene_index: index,
                    stage: Stage::Render,
                    status: output.status,
                    fingerprint: Some(output.fingerprint().to_string()),
                    error: None,
                });
                publish_scene_progress(inner, job, index);
                segments.push((index, output.artifact));
            }
            Err(PipelineError::Cancelled) => {}
            Err(e) => {
                job.record_stage(SceneStageResult {
                    scene_index: index,
                    stage: Stage::Render,
                    status: StageStatus::Failed,
                    fingerprint: None,
                    error: Some(e.to_string()),
                });
                job.drop_scene(index);
                warn!(job_id = %job.id, scene = index, error = %e, "Scene render failed, dropping scene");
            }
        }
    }
    inner.jobs.save(job).await?;

    // The concat graph requires strict ascending scene order.
    segments.sort_by_key(|(index, _)| *index);
    Ok(segments.into_iter().map(|(_, artifact)| artifact).collect())
}

/// Advance the job state, persist, and publish.
async fn advance(
    inner: &Arc<SchedulerInner>,
    job: &mut Job,
    next: JobState,
) -> PipelineResult<()> {
    if !job.transition_to(next) {
        return Err(PipelineError::fatal(format!(
            "illegal transition {} -> {}",
            job.state, next
        )));
    }
    inner.jobs.save(job).await?;
    inner.progress.publish(ProgressUpdate::new(
        job.id.clone(),
        job.state,
        job.progress_percent(),
    ));
    Ok(())
}

/// Observe the cancellation flag at a stage checkpoint.
async fn check_cancel(
    inner: &Arc<SchedulerInner>,
    job: &mut Job,
    cancel_rx: &watch::Receiver<bool>,
) -> PipelineResult<bool> {
    if !*cancel_rx.borrow() {
        return Ok(false);
    }
    job.cancel_requested = true;
    job.cancel();
    inner.jobs.save(job).await?;
    inner.progress.publish(ProgressUpdate::new(
        job.id.clone(),
        JobState::Cancelled,
        job.progress_percent(),
    ));
    info!(job_id = %job.id, "Job cancelled at checkpoint");
    Ok(true)
}

async fn fail_job(
    inner: &Arc<SchedulerInner>,
    job: &mut Job,
    error: JobError,
) -> PipelineResult<JobState> {
    JobLogger::new(&job.id, error.stage.as_str()).log_error(&error.message);
    job.fail(error);
    inner.jobs.save(job).await?;
    inner.progress.publish(ProgressUpdate::new(
        job.id.clone(),
        JobState::Failed,
        job.progress_percent(),
    ));
    Ok(JobState::Failed)
}

/// Stage a job was in when its process died, for the structured error.
fn interrupted_stage(state: JobState) -> Stage {
    match state {
        JobState::Queued | JobState::Extracting => Stage::Extract,
        JobState::Narrating => Stage::Narrate,
        JobState::Rendering => Stage::Render,
        JobState::Concatenating => Stage::Concatenate,
        _ => Stage::Export,
    }
}

fn publish_scene_progress(inner: &Arc<SchedulerInner>, job: &Job, scene_index: u32) {
    inner.progress.publish(
        ProgressUpdate::new(job.id.clone(), job.state, job.progress_percent())
            .with_scene(scene_index),
    );
}
