//! Stage runner: the five pipeline stages against the artifact store.
//!
//! Every scene-scoped stage consults the store first and reports
//! `SkippedCached` on a hit, so re-submitting an unchanged project does
//! close to zero work. Producers write into store-staged paths; the
//! store publishes them atomically.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use metrics::counter;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use slidecast_models::{naming, Scene, StageStatus, StyleDefaults, StylePreset, VoiceSpec};
use slidecast_providers::{
    DocumentExtractor, NarrationAudio, NarrationChain, ProviderError, SceneComposition,
    SceneRenderer, VideoAssembler,
};
use slidecast_store::{
    final_fingerprint, narration_fingerprint, render_fingerprint, Artifact, ArtifactKind,
    ArtifactStore, Fingerprint,
};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::retry::{retry_async_if, RetryConfig};

/// Segment length for scenes with no narration and no explicit floor.
const DEFAULT_SCENE_SECS: f64 = 3.0;

/// Result of one scene-scoped stage: the artifact plus whether it came
/// from the cache.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub artifact: Artifact,
    pub status: StageStatus,
}

impl StageOutput {
    fn from_put(artifact: Artifact, produced: bool) -> Self {
        Self {
            artifact,
            status: if produced {
                StageStatus::Succeeded
            } else {
                StageStatus::SkippedCached
            },
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.artifact.fingerprint
    }
}

/// Executes the pipeline stages using pluggable providers.
pub struct StageRunner {
    extractor: Option<Arc<dyn DocumentExtractor>>,
    narration: NarrationChain,
    renderer: Arc<dyn SceneRenderer>,
    assembler: Arc<dyn VideoAssembler>,
    store: ArtifactStore,
    config: PipelineConfig,
}

impl StageRunner {
    pub fn new(
        narration: NarrationChain,
        renderer: Arc<dyn SceneRenderer>,
        assembler: Arc<dyn VideoAssembler>,
        store: ArtifactStore,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor: None,
            narration,
            renderer,
            assembler,
            store,
            config,
        }
    }

    /// Attach a document extractor for document-sourced projects.
    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    fn retry_config(&self, operation: &str) -> RetryConfig {
        RetryConfig::new(operation)
            .with_max_retries(self.config.max_retries)
            .with_base_delay(self.config.retry_base_delay)
    }

    /// EXTRACT: turn a document into ordered scenes.
    ///
    /// Pages without text are skipped; the remaining pages get contiguous
    /// order indices. A document yielding no text at all is a validation
    /// failure.
    pub async fn run_extraction(&self, document: &Path) -> PipelineResult<Vec<Scene>> {
        let extractor = self
            .extractor
            .as_ref()
            .ok_or_else(|| PipelineError::fatal("no document extractor configured"))?;

        info!(document = %document.display(), extractor = extractor.name(), "Extracting scenes");
        let pages = extractor.extract(document).await.map_err(PipelineError::from)?;

        let total_pages = pages.len();
        let scenes: Vec<Scene> = pages
            .into_iter()
            .filter(|p| p.has_text())
            .enumerate()
            .map(|(order, page)| Scene::new(page.index, order as u32, page.text))
            .collect();

        if scenes.is_empty() {
            return Err(PipelineError::validation(
                "document has no extractable text",
            ));
        }

        debug!(
            scenes = scenes.len(),
            skipped = total_pages - scenes.len(),
            "Extraction finished"
        );
        Ok(scenes)
    }

    /// NARRATE: synthesize one scene's narration, cache-first.
    pub async fn run_narration(
        &self,
        scene: &Scene,
        voice: &VoiceSpec,
        work_dir: &Path,
    ) -> PipelineResult<StageOutput> {
        let text = scene.text.trim();
        let fingerprint = narration_fingerprint(text, voice, &self.narration.chain_version());
        let scene_index = scene.order_index;

        let (artifact, produced) = self
            .store
            .put_with(&fingerprint, ArtifactKind::Audio, |staging| async move {
                // Synthesize under the conventional name, then hand the
                // file to the store
                let scratch = work_dir.join(naming::narration_file_name(scene_index, &Uuid::new_v4()));
                let audio = self.synthesize_with_chain(text, voice, &scratch).await?;
                fs::rename(&audio.path, &staging)
                    .await
                    .map_err(ProviderError::Io)?;
                Ok(Some(audio.duration_secs))
            })
            .await?;

        record_cache_metric("narration", produced);
        Ok(StageOutput::from_put(artifact, produced))
    }

    /// Walk the narration chain: retry the current engine on transient
    /// failures, then fall to the next.
    async fn synthesize_with_chain(
        &self,
        text: &str,
        voice: &VoiceSpec,
        dest: &Path,
    ) -> Result<NarrationAudio, ProviderError> {
        let retry = self.retry_config("narration");
        let mut last_error = None;

        for provider in self.narration.providers() {
            let attempt = retry_async_if(
                &retry,
                || async {
                    tokio::time::timeout(
                        self.config.narrate_timeout,
                        provider.synthesize(text, voice, dest),
                    )
                    .await
                    .unwrap_or(Err(ProviderError::Timeout(
                        self.config.narrate_timeout.as_secs(),
                    )))
                },
                ProviderError::is_transient,
            )
            .await;

            match attempt.into_result() {
                Ok(audio) => return Ok(audio),
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        error = %e,
                        "Narration engine failed, trying next in chain"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::permanent("narration chain is empty")))
    }

    /// RENDER: compose one scene segment, cache-first.
    ///
    /// Segment duration is `max(narration duration, scene floor)`, or a
    /// fixed default for silent scenes without a floor.
    pub async fn run_render(
        &self,
        scene: &Scene,
        preset: StylePreset,
        style: &StyleDefaults,
        narration: Option<&Artifact>,
    ) -> PipelineResult<StageOutput> {
        let narration_fp = narration
            .map(|a| Fingerprint::from_hex(a.fingerprint.clone()))
            .transpose()?;
        let fingerprint = render_fingerprint(
            scene,
            preset,
            style,
            self.config.quality,
            self.renderer.renderer_version(),
            narration_fp.as_ref(),
        );

        let narration_duration = narration.and_then(|a| a.duration_secs).unwrap_or(0.0);
        let floor = scene
            .duration_floor_secs
            .unwrap_or(if narration.is_some() { 0.0 } else { DEFAULT_SCENE_SECS });
        let duration_secs = narration_duration.max(floor);

        let composition = SceneComposition {
            scene_index: scene.order_index,
            overlay_text: scene.text.trim().to_string(),
            assets: scene.assets.clone(),
            preset,
            style: style.clone(),
            narration_path: narration.map(|a| a.path.clone()),
            duration_secs,
            quality: self.config.quality,
        };

        let retry = self.retry_config("render");
        let (artifact, produced) = self
            .store
            .put_with(&fingerprint, ArtifactKind::VideoSegment, |staging| {
                let composition = composition.clone();
                async move {
                    let segment = retry_async_if(
                        &retry,
                        || self.renderer.compose(&composition, &staging),
                        ProviderError::is_transient,
                    )
                    .await
                    .into_result()?;
                    Ok(Some(segment.duration_secs))
                }
            })
            .await?;

        record_cache_metric("render", produced);
        Ok(StageOutput::from_put(artifact, produced))
    }

    /// CONCATENATE: join surviving segments in ascending scene order.
    pub async fn run_concatenate(
        &self,
        segments: &[Artifact],
        work_dir: &Path,
    ) -> PipelineResult<PathBuf> {
        if segments.is_empty() {
            return Err(PipelineError::AllScenesFailed);
        }

        let paths: Vec<PathBuf> = segments.iter().map(|a| a.path.clone()).collect();
        let dest = work_dir.join("joined.mp4");

        info!(segments = paths.len(), "Concatenating segments");
        self.assembler
            .concat(&paths, self.config.transition_secs, &dest)
            .await
            .map_err(PipelineError::from)
    }

    /// EXPORT: re-encode the joined timeline and publish the final video.
    ///
    /// The encode is cached by a fingerprint over the ordered segment
    /// fingerprints; publication copies the cached payload to the output
    /// directory under the job's presentation name.
    pub async fn run_export(
        &self,
        joined: &Path,
        segments: &[Artifact],
        job_uuid: &Uuid,
    ) -> PipelineResult<(StageOutput, PathBuf)> {
        let segment_fps = segments
            .iter()
            .map(|a| Fingerprint::from_hex(a.fingerprint.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let fingerprint = final_fingerprint(
            &segment_fps.iter().collect::<Vec<_>>(),
            self.config.transition_secs,
            self.config.quality,
        );

        let quality = self.config.quality;
        let (artifact, produced) = self
            .store
            .put_with(&fingerprint, ArtifactKind::FinalVideo, |staging| async move {
                self.assembler.export(joined, quality, &staging).await?;
                Ok(None)
            })
            .await?;

        record_cache_metric("export", produced);

        let published = self
            .publish_output(&artifact.path, &naming::final_video_name(job_uuid))
            .await?;
        Ok((StageOutput::from_put(artifact, produced), published))
    }

    /// Copy a payload into the output directory without exposing a
    /// partial file under the final name.
    async fn publish_output(&self, payload: &Path, file_name: &str) -> PipelineResult<PathBuf> {
        fs::create_dir_all(&self.config.output_dir).await?;
        let dest = self.config.output_dir.join(file_name);
        let staging = dest.with_extension("part.mp4");
        fs::copy(payload, &staging).await?;
        fs::rename(&staging, &dest).await?;
        Ok(dest)
    }
}

fn record_cache_metric(stage: &'static str, produced: bool) {
    if produced {
        counter!("slidecast_cache_misses_total", "stage" => stage).increment(1);
    } else {
        counter!("slidecast_cache_hits_total", "stage" => stage).increment(1);
    }
}
