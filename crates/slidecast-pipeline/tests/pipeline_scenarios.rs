//! End-to-end scheduler scenarios with in-memory providers.
//!
//! Each concern gets a real scheduler over a temp directory; the
//! providers are deterministic fakes, so no external tools run.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use slidecast_models::{
    Job, JobId, JobSnapshot, JobState, Project, ProjectId, QualityPreset, Scene, Stage,
    StageStatus, StyleDefaults, VoiceSpec,
};
use slidecast_pipeline::{JobScheduler, JobStore, PipelineConfig, StageRunner};
use slidecast_providers::{
    DocumentExtractor, ExtractedPage, NarrationAudio, NarrationChain, NarrationProvider,
    ProviderError, ProviderResult, RenderedSegment, SceneComposition, SceneRenderer,
    VideoAssembler,
};
use slidecast_store::ArtifactStore;

/// TTS fake: fixed duration, optional failure on a text substring,
/// text-dependent delay so completion order is scrambled.
struct MockTts {
    calls: Arc<AtomicU32>,
    fail_substring: Option<&'static str>,
    delay_ms_per_call: u64,
    duration_secs: f64,
}

impl MockTts {
    fn new(calls: Arc<AtomicU32>) -> Self {
        Self {
            calls,
            fail_substring: None,
            delay_ms_per_call: 0,
            duration_secs: 5.0,
        }
    }

    fn failing_on(mut self, substring: &'static str) -> Self {
        self.fail_substring = Some(substring);
        self
    }

    fn with_delay_ms(mut self, delay: u64) -> Self {
        self.delay_ms_per_call = delay;
        self
    }
}

#[async_trait]
impl NarrationProvider for MockTts {
    fn name(&self) -> &str {
        "mock-tts"
    }

    fn provider_version(&self) -> &str {
        "1"
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceSpec,
        dest: &Path,
    ) -> ProviderResult<NarrationAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Text-dependent jitter scrambles scene completion order
        let jitter = (text.len() as u64 * 13) % 40;
        tokio::time::sleep(Duration::from_millis(self.delay_ms_per_call + jitter)).await;

        if let Some(s) = self.fail_substring {
            if text.contains(s) {
                return Err(ProviderError::permanent("voice refused this text"));
            }
        }

        tokio::fs::write(dest, b"audio").await.map_err(ProviderError::Io)?;
        Ok(NarrationAudio {
            path: dest.to_path_buf(),
            duration_secs: self.duration_secs,
        })
    }
}

/// Renderer fake: the segment payload carries the scene index so the
/// assembler fake can verify ordering.
struct MockRenderer;

#[async_trait]
impl SceneRenderer for MockRenderer {
    fn name(&self) -> &str {
        "mock-renderer"
    }

    fn renderer_version(&self) -> &str {
        "1"
    }

    async fn compose(
        &self,
        spec: &SceneComposition,
        dest: &Path,
    ) -> ProviderResult<RenderedSegment> {
        let jitter = (spec.scene_index as u64 * 17) % 30;
        tokio::time::sleep(Duration::from_millis(jitter)).await;
        tokio::fs::write(dest, format!("segment:{}", spec.scene_index))
            .await
            .map_err(ProviderError::Io)?;
        Ok(RenderedSegment {
            path: dest.to_path_buf(),
            duration_secs: spec.duration_secs,
        })
    }
}

/// Assembler fake: records every concat call's segment scene indices
/// and transition.
#[derive(Default)]
struct MockAssembler {
    concat_calls: Mutex<Vec<(Vec<u32>, f64)>>,
}

impl MockAssembler {
    fn recorded(&self) -> Vec<(Vec<u32>, f64)> {
        self.concat_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoAssembler for MockAssembler {
    fn name(&self) -> &str {
        "mock-assembler"
    }

    async fn concat(
        &self,
        segments: &[PathBuf],
        transition_secs: f64,
        dest: &Path,
    ) -> ProviderResult<PathBuf> {
        let mut indices = Vec::new();
        for segment in segments {
            let payload = tokio::fs::read_to_string(segment)
                .await
                .map_err(ProviderError::Io)?;
            let index = payload
                .strip_prefix("segment:")
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ProviderError::permanent("unexpected segment payload"))?;
            indices.push(index);
        }
        self.concat_calls
            .lock()
            .unwrap()
            .push((indices, transition_secs));
        tokio::fs::write(dest, b"joined").await.map_err(ProviderError::Io)?;
        Ok(dest.to_path_buf())
    }

    async fn export(
        &self,
        input: &Path,
        _quality: QualityPreset,
        dest: &Path,
    ) -> ProviderResult<PathBuf> {
        tokio::fs::copy(input, dest).await.map_err(ProviderError::Io)?;
        Ok(dest.to_path_buf())
    }
}

fn test_config(dir: &TempDir) -> PipelineConfig {
    PipelineConfig {
        work_dir: dir.path().join("work"),
        store_dir: dir.path().join("store"),
        state_dir: dir.path().join("state"),
        output_dir: dir.path().join("out"),
        retry_base_delay: Duration::from_millis(1),
        transition_secs: 0.5,
        ..Default::default()
    }
}

async fn scheduler_with(
    dir: &TempDir,
    tts: Arc<dyn NarrationProvider>,
    assembler: Arc<MockAssembler>,
) -> JobScheduler {
    let config = test_config(dir);
    tokio::fs::create_dir_all(&config.work_dir).await.unwrap();
    let store = ArtifactStore::open(&config.store_dir).await.unwrap();
    let jobs = JobStore::open(&config.state_dir).await.unwrap();
    let runner = StageRunner::new(
        NarrationChain::single(tts),
        Arc::new(MockRenderer),
        assembler,
        store,
        config.clone(),
    );
    JobScheduler::new(runner, jobs, config)
}

fn project_with(texts: &[&str]) -> Project {
    let scenes = texts
        .iter()
        .enumerate()
        .map(|(i, text)| Scene::new(i as u32, i as u32, *text))
        .collect();
    Project::new(scenes)
}

async fn wait_terminal(scheduler: &JobScheduler, job_id: &JobId) -> JobSnapshot {
    for _ in 0..1000 {
        let snapshot = scheduler.status(job_id).await.unwrap();
        if snapshot.state.is_terminal() {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job never reached a terminal state");
}

#[tokio::test]
async fn test_happy_path_three_scenes() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let assembler = Arc::new(MockAssembler::default());
    let scheduler = scheduler_with(
        &dir,
        Arc::new(MockTts::new(calls.clone())),
        assembler.clone(),
    )
    .await;

    let job_id = scheduler
        .submit(project_with(&["Welcome", "The middle part", "Thanks for watching"]))
        .await
        .unwrap();
    let snapshot = wait_terminal(&scheduler, &job_id).await;

    assert_eq!(snapshot.state, JobState::Completed);
    assert_eq!(snapshot.progress, 100);
    assert!(snapshot.dropped_scenes.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Every scene narrated and rendered successfully
    let successes = snapshot
        .stage_results
        .iter()
        .filter(|r| r.status == StageStatus::Succeeded)
        .count();
    assert_eq!(successes, 6);

    // One concat of all three segments, in order, with the cross-fade
    let concats = assembler.recorded();
    assert_eq!(concats, vec![(vec![0, 1, 2], 0.5)]);

    // Final video published under the job's presentation name
    let result = snapshot.result_path.expect("completed job has a result");
    assert!(result.ends_with(&format!("presentation_{}.mp4", job_id)));
    assert!(PathBuf::from(&result).exists());
}

#[tokio::test]
async fn test_empty_project_rejected_without_a_job() {
    let dir = TempDir::new().unwrap();
    let assembler = Arc::new(MockAssembler::default());
    let scheduler = scheduler_with(
        &dir,
        Arc::new(MockTts::new(Arc::new(AtomicU32::new(0)))),
        assembler,
    )
    .await;

    let err = scheduler.submit(project_with(&[])).await.unwrap_err();
    assert!(matches!(
        err,
        slidecast_pipeline::PipelineError::Validation(_)
    ));
    assert!(scheduler.list().await.is_empty());
}

#[tokio::test]
async fn test_permanent_narration_failure_degrades_output() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let assembler = Arc::new(MockAssembler::default());
    let scheduler = scheduler_with(
        &dir,
        Arc::new(MockTts::new(calls).failing_on("poison")),
        assembler.clone(),
    )
    .await;

    let job_id = scheduler
        .submit(project_with(&["First scene", "poison pill", "Third scene"]))
        .await
        .unwrap();
    let snapshot = wait_terminal(&scheduler, &job_id).await;

    // The failed scene is dropped; the job still completes
    assert_eq!(snapshot.state, JobState::Completed);
    assert_eq!(snapshot.dropped_scenes, vec![1]);

    let failed: Vec<_> = snapshot
        .stage_results
        .iter()
        .filter(|r| r.status == StageStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].scene_index, 1);
    assert_eq!(failed[0].stage, Stage::Narrate);

    let concats = assembler.recorded();
    assert_eq!(concats, vec![(vec![0, 2], 0.5)]);
}

#[tokio::test]
async fn test_all_scenes_failing_fails_the_job() {
    let dir = TempDir::new().unwrap();
    let assembler = Arc::new(MockAssembler::default());
    let scheduler = scheduler_with(
        &dir,
        Arc::new(MockTts::new(Arc::new(AtomicU32::new(0))).failing_on("scene")),
        assembler.clone(),
    )
    .await;

    let job_id = scheduler
        .submit(project_with(&["scene one", "scene two"]))
        .await
        .unwrap();
    let snapshot = wait_terminal(&scheduler, &job_id).await;

    assert_eq!(snapshot.state, JobState::Failed);
    let error = snapshot.error.expect("failed job carries an error");
    assert_eq!(error.stage, Stage::Render);
    assert!(assembler.recorded().is_empty());
    assert!(snapshot.result_path.is_none());
}

#[tokio::test]
async fn test_resubmission_reuses_cached_artifacts() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let assembler = Arc::new(MockAssembler::default());
    let scheduler = scheduler_with(
        &dir,
        Arc::new(MockTts::new(calls.clone())),
        assembler,
    )
    .await;

    let project = project_with(&["Intro", "Outro"]);

    let first = scheduler.submit(project.clone()).await.unwrap();
    let first_snapshot = wait_terminal(&scheduler, &first).await;
    assert_eq!(first_snapshot.state, JobState::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let second = scheduler.submit(project).await.unwrap();
    let second_snapshot = wait_terminal(&scheduler, &second).await;
    assert_eq!(second_snapshot.state, JobState::Completed);

    // No new synthesis; every scene stage is a cache hit
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(second_snapshot
        .stage_results
        .iter()
        .all(|r| r.status == StageStatus::SkippedCached));

    // Both jobs still get their own published file
    let result = second_snapshot.result_path.unwrap();
    assert!(result.ends_with(&format!("presentation_{}.mp4", second)));
    assert!(PathBuf::from(&result).exists());
}

#[tokio::test]
async fn test_scene_order_survives_scrambled_completion() {
    let dir = TempDir::new().unwrap();
    let assembler = Arc::new(MockAssembler::default());
    let scheduler = scheduler_with(
        &dir,
        Arc::new(MockTts::new(Arc::new(AtomicU32::new(0))).with_delay_ms(5)),
        assembler.clone(),
    )
    .await;

    let texts = ["a", "bbbbbbbbbb", "cc", "ddddddddddddddddd", "eeee"];
    let job_id = scheduler.submit(project_with(&texts)).await.unwrap();
    let snapshot = wait_terminal(&scheduler, &job_id).await;

    assert_eq!(snapshot.state, JobState::Completed);
    let concats = assembler.recorded();
    assert_eq!(concats.len(), 1);
    assert_eq!(concats[0].0, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_cancellation_stops_before_publishing() {
    let dir = TempDir::new().unwrap();
    let assembler = Arc::new(MockAssembler::default());
    let scheduler = scheduler_with(
        &dir,
        Arc::new(MockTts::new(Arc::new(AtomicU32::new(0))).with_delay_ms(300)),
        assembler.clone(),
    )
    .await;

    let job_id = scheduler
        .submit(project_with(&["One", "Two", "Three"]))
        .await
        .unwrap();

    // Let narration start, then pull the plug
    tokio::time::sleep(Duration::from_millis(50)).await;
    scheduler.cancel(&job_id).await.unwrap();

    // Cancel only raises the flag; the driver records the terminal
    // state at its next checkpoint
    let immediate = scheduler.status(&job_id).await.unwrap();
    assert!(!immediate.state.is_terminal());

    let snapshot = wait_terminal(&scheduler, &job_id).await;
    assert_eq!(snapshot.state, JobState::Cancelled);
    assert!(snapshot.result_path.is_none());

    // Nothing was published
    let out_dir = dir.path().join("out");
    let published = match tokio::fs::read_dir(&out_dir).await {
        Ok(mut entries) => entries.next_entry().await.unwrap().is_some(),
        Err(_) => false,
    };
    assert!(!published);

    // Narrations that were already in flight finished into the cache
    let mut audio = tokio::fs::read_dir(dir.path().join("store").join("audio"))
        .await
        .unwrap();
    assert!(audio.next_entry().await.unwrap().is_some());
}

#[tokio::test]
async fn test_document_submission_extracts_scenes() {
    struct FixedDeck;

    #[async_trait]
    impl DocumentExtractor for FixedDeck {
        fn name(&self) -> &str {
            "fixed-deck"
        }

        async fn extract(&self, _path: &Path) -> ProviderResult<Vec<ExtractedPage>> {
            Ok(vec![
                ExtractedPage::new(0, "Cover slide"),
                ExtractedPage::new(1, "   "),
                ExtractedPage::new(2, "Closing slide"),
            ])
        }
    }

    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    tokio::fs::create_dir_all(&config.work_dir).await.unwrap();
    let store = ArtifactStore::open(&config.store_dir).await.unwrap();
    let jobs = JobStore::open(&config.state_dir).await.unwrap();
    let assembler = Arc::new(MockAssembler::default());
    let runner = StageRunner::new(
        NarrationChain::single(Arc::new(MockTts::new(Arc::new(AtomicU32::new(0))))),
        Arc::new(MockRenderer),
        assembler.clone(),
        store,
        config.clone(),
    )
    .with_extractor(Arc::new(FixedDeck));
    let scheduler = JobScheduler::new(runner, jobs, config);

    let job_id = scheduler
        .submit_document(PathBuf::from("deck.pdf"), StyleDefaults::default())
        .await
        .unwrap();
    let snapshot = wait_terminal(&scheduler, &job_id).await;

    // The blank slide is filtered; the two remaining become scenes 0 and 1
    assert_eq!(snapshot.state, JobState::Completed);
    assert_eq!(assembler.recorded(), vec![(vec![0, 1], 0.5)]);
}

#[tokio::test]
async fn test_unknown_job_id() {
    let dir = TempDir::new().unwrap();
    let scheduler = scheduler_with(
        &dir,
        Arc::new(MockTts::new(Arc::new(AtomicU32::new(0)))),
        Arc::new(MockAssembler::default()),
    )
    .await;

    let ghost = JobId::new();
    assert!(matches!(
        scheduler.status(&ghost).await,
        Err(slidecast_pipeline::PipelineError::JobNotFound(_))
    ));
    assert!(matches!(
        scheduler.cancel(&ghost).await,
        Err(slidecast_pipeline::PipelineError::JobNotFound(_))
    ));
}

#[tokio::test]
async fn test_job_records_survive_restart() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let assembler = Arc::new(MockAssembler::default());

    let job_id = {
        let scheduler = scheduler_with(
            &dir,
            Arc::new(MockTts::new(calls.clone())),
            assembler.clone(),
        )
        .await;
        let job_id = scheduler.submit(project_with(&["Persistent"])).await.unwrap();
        wait_terminal(&scheduler, &job_id).await;
        job_id
    };

    // A fresh scheduler over the same state dir sees the finished job
    let scheduler = scheduler_with(&dir, Arc::new(MockTts::new(calls)), assembler).await;
    let snapshot = scheduler.status(&job_id).await.unwrap();
    assert_eq!(snapshot.state, JobState::Completed);
}

#[tokio::test]
async fn test_jobs_interrupted_by_restart_are_failed() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    // A record left mid-flight by a dead process: no driver exists for it
    let job_id = {
        let jobs = JobStore::open(&config.state_dir).await.unwrap();
        let mut job = Job::new(ProjectId::new(), 3);
        assert!(job.transition_to(JobState::Extracting));
        assert!(job.transition_to(JobState::Narrating));
        jobs.save(&job).await.unwrap();
        job.id
    };

    let scheduler = scheduler_with(
        &dir,
        Arc::new(MockTts::new(Arc::new(AtomicU32::new(0)))),
        Arc::new(MockAssembler::default()),
    )
    .await;

    let snapshot = wait_terminal(&scheduler, &job_id).await;
    assert_eq!(snapshot.state, JobState::Failed);
    let error = snapshot.error.expect("interrupted job carries an error");
    assert_eq!(error.stage, Stage::Narrate);

    // Cancel on the swept job is a no-op, not a hang
    scheduler.cancel(&job_id).await.unwrap();

    // Jobs submitted to the new scheduler are untouched by the sweep
    let fresh = scheduler.submit(project_with(&["Still alive"])).await.unwrap();
    let fresh_snapshot = wait_terminal(&scheduler, &fresh).await;
    assert_eq!(fresh_snapshot.state, JobState::Completed);
}
