//! FFmpeg-backed concatenation and export.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use slidecast_models::{EncodingConfig, QualityPreset};
use slidecast_providers::{ProviderError, ProviderResult, VideoAssembler};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::compose::map_media_error;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::move_file;
use crate::probe::get_duration;

/// Joins segments and exports the final video by shelling out to FFmpeg.
pub struct FfmpegAssembler {
    timeout_secs: u64,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Default for FfmpegAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegAssembler {
    pub fn new() -> Self {
        Self {
            timeout_secs: 600,
            cancel_rx: None,
        }
    }

    /// Set the concat/export timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    fn runner(&self) -> FfmpegRunner {
        let mut runner = FfmpegRunner::new().with_timeout(self.timeout_secs);
        if let Some(ref rx) = self.cancel_rx {
            runner = runner.with_cancel(rx.clone());
        }
        runner
    }

    /// Lossless join via the concat demuxer. All segments share one
    /// encoding profile, so stream copy is safe.
    async fn concat_stream_copy(&self, segments: &[PathBuf], dest: &Path) -> MediaResult<()> {
        let list_path = dest.with_extension("concat.txt");
        let list_content: String = segments
            .iter()
            .map(|p| format!("file '{}'\n", p.display()))
            .collect();
        fs::write(&list_path, &list_content).await?;

        let cmd = FfmpegCommand::new(dest)
            .input_with_args(["-f", "concat", "-safe", "0"], &list_path)
            .output_args(["-c", "copy"]);

        let result = self.runner().run(&cmd).await;

        let _ = fs::remove_file(&list_path).await;
        result
    }

    /// Join with cross-fades between consecutive segments. Requires
    /// re-encoding: every xfade/acrossfade pair consumes two streams.
    async fn concat_with_transitions(
        &self,
        segments: &[PathBuf],
        transition_secs: f64,
        dest: &Path,
    ) -> MediaResult<()> {
        let mut durations = Vec::with_capacity(segments.len());
        for segment in segments {
            durations.push(get_duration(segment).await?);
        }

        let filter = build_xfade_graph(&durations, transition_secs);
        debug!(filter = %filter, "Concat filter graph");

        let mut cmd = FfmpegCommand::new(dest);
        for segment in segments {
            cmd = cmd.input(segment);
        }
        let cmd = cmd
            .filter_complex(filter)
            .map("[vout]")
            .map("[aout]")
            .video_codec("libx264")
            .preset("fast")
            .audio_codec("aac")
            .audio_bitrate("128k");

        self.runner().run(&cmd).await
    }
}

#[async_trait]
impl VideoAssembler for FfmpegAssembler {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    #[instrument(skip(self, segments), fields(count = segments.len()))]
    async fn concat(
        &self,
        segments: &[PathBuf],
        transition_secs: f64,
        dest: &Path,
    ) -> ProviderResult<PathBuf> {
        if segments.is_empty() {
            return Err(ProviderError::permanent("no segments to concatenate"));
        }
        for segment in segments {
            if !segment.exists() {
                return Err(map_media_error(MediaError::FileNotFound(segment.clone())));
            }
        }

        let result = if segments.len() == 1 || transition_secs <= 0.0 {
            self.concat_stream_copy(segments, dest).await
        } else {
            self.concat_with_transitions(segments, transition_secs, dest)
                .await
        };
        result.map_err(map_media_error)?;

        info!(dest = %dest.display(), "Concatenated {} segments", segments.len());
        Ok(dest.to_path_buf())
    }

    #[instrument(skip(self))]
    async fn export(
        &self,
        input: &Path,
        quality: QualityPreset,
        dest: &Path,
    ) -> ProviderResult<PathBuf> {
        if !input.exists() {
            return Err(map_media_error(MediaError::FileNotFound(
                input.to_path_buf(),
            )));
        }

        // Encode to a temp name, publish with an atomic rename
        let staging = dest.with_extension("part.mp4");
        let encoding = EncodingConfig::for_quality(quality);

        let cmd = FfmpegCommand::new(&staging)
            .input(input)
            .output_args(encoding.to_ffmpeg_args())
            .output_arg("-pix_fmt")
            .output_arg("yuv420p");

        if let Err(e) = self.runner().run(&cmd).await {
            let _ = fs::remove_file(&staging).await;
            return Err(map_media_error(e));
        }

        move_file(&staging, dest).await.map_err(map_media_error)?;

        info!(dest = %dest.display(), "Exported final video");
        Ok(dest.to_path_buf())
    }
}

/// Build an xfade/acrossfade graph joining `durations.len()` inputs.
///
/// The i-th fade starts `transition` seconds before the running timeline
/// ends, so each join overlaps the outgoing and incoming segments.
fn build_xfade_graph(durations: &[f64], transition: f64) -> String {
    let mut parts = Vec::new();

    let mut video_in = "[0:v]".to_string();
    let mut audio_in = "[0:a]".to_string();
    let mut timeline = durations[0];

    for (i, duration) in durations.iter().enumerate().skip(1) {
        let offset = (timeline - transition).max(0.0);
        let last = i == durations.len() - 1;
        let video_out = if last {
            "[vout]".to_string()
        } else {
            format!("[v{i}]")
        };
        let audio_out = if last {
            "[aout]".to_string()
        } else {
            format!("[a{i}]")
        };

        parts.push(format!(
            "{video_in}[{i}:v]xfade=transition=fade:duration={transition:.3}:offset={offset:.3}{video_out}"
        ));
        parts.push(format!(
            "{audio_in}[{i}:a]acrossfade=d={transition:.3}{audio_out}"
        ));

        timeline = timeline + duration - transition;
        video_in = video_out;
        audio_in = audio_out;
    }

    parts.join(";")
}
