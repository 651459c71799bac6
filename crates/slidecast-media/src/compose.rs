//! FFmpeg-backed scene composition.
//!
//! Builds one filter graph per scene: a solid background, the scene's
//! positioned assets overlaid in order, a text overlay styled by the
//! scene's preset, and the narration track (or silence) padded to the
//! segment duration.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, instrument};

use slidecast_models::{EncodingConfig, StylePreset};
use slidecast_providers::{ProviderError, ProviderResult, RenderedSegment, SceneComposition, SceneRenderer};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaError;

/// Renders scene segments by shelling out to FFmpeg.
pub struct FfmpegSceneRenderer {
    timeout_secs: u64,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Default for FfmpegSceneRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegSceneRenderer {
    pub fn new() -> Self {
        Self {
            timeout_secs: 300,
            cancel_rx: None,
        }
    }

    /// Set the per-scene render timeout.
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
}

#[async_trait]
impl SceneRenderer for FfmpegSceneRenderer {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn renderer_version(&self) -> &str {
        // Bump when the filter graph layout changes, so cached segments
        // rendered by an older graph are not reused.
        "scene-graph-1"
    }

    #[instrument(skip(self, spec), fields(scene_index = spec.scene_index))]
    async fn compose(
        &self,
        spec: &SceneComposition,
        dest: &Path,
    ) -> ProviderResult<RenderedSegment> {
        let (width, height) = spec.quality.resolution();
        let fps = spec.quality.fps();
        let duration = spec.duration_secs;

        let mut cmd = FfmpegCommand::new(dest).lavfi_input(format!(
            "color=c={}:s={}x{}:r={}:d={:.3}",
            spec.style.background_color, width, height, fps, duration
        ));

        for asset in &spec.assets {
            // Loop still images for the full segment
            cmd = cmd.input_with_args(
                ["-loop", "1", "-t", &format!("{:.3}", duration)],
                &asset.path,
            );
        }

        let audio_input_index = spec.assets.len() + 1;
        cmd = match &spec.narration_path {
            Some(path) => cmd.input(path),
            None => cmd.lavfi_input(format!(
                "anullsrc=channel_layout=stereo:sample_rate=44100:d={:.3}",
                duration
            )),
        };

        let filter = build_scene_filter(spec, audio_input_index);
        debug!(filter = %filter, "Scene filter graph");

        let encoding = EncodingConfig::for_quality(spec.quality);
        let cmd = cmd
            .filter_complex(filter)
            .map("[vout]")
            .map("[aout]")
            .output_args(encoding.to_ffmpeg_args())
            .output_arg("-pix_fmt")
            .output_arg("yuv420p")
            .duration(duration);

        let total_ms = (duration * 1000.0) as i64;
        let scene_index = spec.scene_index;
        self.runner()
            .run_with_progress(&cmd, move |p| {
                debug!(
                    scene_index,
                    percent = p.percentage(total_ms),
                    eta_secs = p.eta_seconds(total_ms),
                    "Scene render progress"
                );
            })
            .await
            .map_err(map_media_error)?;

        if !dest.exists() {
            return Err(ProviderError::permanent(format!(
                "scene {} render produced no output",
                spec.scene_index
            )));
        }

        Ok(RenderedSegment {
            path: dest.to_path_buf(),
            duration_secs: duration,
        })
    }
}

/// Translate media-layer failures into the provider error taxonomy.
pub(crate) fn map_media_error(err: MediaError) -> ProviderError {
    match err {
        MediaError::Timeout(secs) => ProviderError::Timeout(secs),
        MediaError::Cancelled => ProviderError::transient("render cancelled"),
        e if e.is_transient() => ProviderError::transient(e.to_string()),
        e => ProviderError::permanent(e.to_string()),
    }
}

/// Build the filter graph for one scene.
///
/// Inputs are laid out as: 0 = background color source, 1..=N = assets in
/// scene order, N+1 = narration audio (or silence).
fn build_scene_filter(spec: &SceneComposition, audio_input_index: usize) -> String {
    let mut parts = Vec::new();
    let mut current = "[0:v]".to_string();

    for (i, asset) in spec.assets.iter().enumerate() {
        let input = i + 1;
        let styled = format!("[asset{i}]");
        let merged = format!("[base{i}]");

        parts.push(format!(
            "[{input}:v]scale=iw*{scale:.4}:-1,format=rgba,colorchannelmixer=aa={opacity:.4}{styled}",
            scale = asset.scale,
            opacity = asset.opacity,
        ));
        // Asset positions are fractions of the frame
        parts.push(format!(
            "{current}{styled}overlay=W*{x:.4}:H*{y:.4}:enable='gte(t,{offset:.3})'{merged}",
            x = asset.x,
            y = asset.y,
            offset = asset.timeline_offset_secs,
        ));
        current = merged;
    }

    let text = escape_drawtext(&spec.overlay_text);
    let drawtext = match spec.preset {
        StylePreset::Minimal => format!(
            "drawtext=font='{font}':fontsize={size}:fontcolor=white:\
             x=(w-text_w)/2:y=h-text_h-h/12:text='{text}'",
            font = spec.style.font,
            size = spec.style.font_size,
        ),
        StylePreset::Classic => format!(
            "drawtext=font='{font}':fontsize={size}:fontcolor=white:\
             box=1:boxcolor=black@0.55:boxborderw=18:\
             x=(w-text_w)/2:y=(h-text_h)/2:text='{text}'",
            font = spec.style.font,
            size = spec.style.font_size,
        ),
        StylePreset::Bold => format!(
            "drawtext=font='{font}':fontsize={size}:fontcolor=white:\
             borderw=4:bordercolor=black:\
             x=(w-text_w)/2:y=(h-text_h)/2:text='{text}'",
            font = spec.style.font,
            size = spec.style.font_size * 3 / 2,
        ),
    };
    parts.push(format!("{current}{drawtext}[vout]"));

    // Pad narration with trailing silence up to the segment duration
    parts.push(format!("[{audio_input_index}:a]apad[aout]"));

    parts.join(";")
}

/// Escape text for FFmpeg's drawtext filter.
fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
        .replace('%', "\\%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use slidecast_models::{AssetRef, QualityPreset, StyleDefaults};

    fn spec_with(assets: Vec<AssetRef>, preset: StylePreset) -> SceneComposition {
        SceneComposition {
            scene_index: 0,
            overlay_text: "Quarterly results: 40% up".to_string(),
            assets,
            preset,
            style: StyleDefaults::default(),
            narration_path: None,
            duration_secs: 5.0,
            quality: QualityPreset::Standard,
        }
    }

    #[test]
    fn test_filter_without_assets_draws_text_on_background() {
        let filter = build_scene_filter(&spec_with(vec![], StylePreset::Minimal), 1);
        assert!(filter.starts_with("[0:v]drawtext="));
        assert!(filter.contains("[vout]"));
        assert!(filter.contains("[1:a]apad[aout]"));
        // drawtext colon escaping
        assert!(filter.contains("Quarterly results\\: 40\\% up"));
    }

    #[test]
    fn test_filter_overlays_assets_in_order() {
        let assets = vec![
            AssetRef::new("logo.png").at(0.05, 0.05).scaled(0.5),
            AssetRef::new("chart.png").at(0.3, 0.1).with_opacity(0.8),
        ];
        let filter = build_scene_filter(&spec_with(assets, StylePreset::Classic), 3);

        assert!(filter.contains("[1:v]scale=iw*0.5000"));
        assert!(filter.contains("colorchannelmixer=aa=0.8000"));
        assert!(filter.contains("[0:v][asset0]overlay=W*0.0500:H*0.0500"));
        assert!(filter.contains("[base0][asset1]overlay=W*0.3000:H*0.1000"));
        assert!(filter.contains("[3:a]apad[aout]"));
    }

    #[test]
    fn test_bold_preset_scales_font() {
        let filter = build_scene_filter(&spec_with(vec![], StylePreset::Bold), 1);
        // default font size 42, bold renders at 63
        assert!(filter.contains("fontsize=63"));
        assert!(filter.contains("borderw=4"));
    }

    #[test]
    fn test_drawtext_escaping() {
        assert_eq!(escape_drawtext("it's 100%"), "it\\'s 100\\%");
        assert_eq!(escape_drawtext("a:b"), "a\\:b");
    }
}
