//! Scene rendering seam.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use slidecast_models::{AssetRef, QualityPreset, StyleDefaults, StylePreset};

use crate::error::ProviderResult;

/// Everything a renderer needs to compose one scene segment.
#[derive(Debug, Clone)]
pub struct SceneComposition {
    /// Scene order index, for logging
    pub scene_index: u32,
    /// Text overlaid on the segment
    pub overlay_text: String,
    /// Positioned assets composited over the background
    pub assets: Vec<AssetRef>,
    /// Effective style preset for this scene
    pub preset: StylePreset,
    /// Project style defaults (background color, font, ...)
    pub style: StyleDefaults,
    /// Narration audio track, if narration succeeded
    pub narration_path: Option<PathBuf>,
    /// Segment duration in seconds: `max(narration duration, scene floor)`
    pub duration_secs: f64,
    /// Working resolution for the segment
    pub quality: QualityPreset,
}

/// A rendered per-scene video segment.
#[derive(Debug, Clone)]
pub struct RenderedSegment {
    /// Path of the produced segment file
    pub path: PathBuf,
    /// Segment duration in seconds
    pub duration_secs: f64,
}

/// Composes one scene's background, assets, text overlay and narration
/// audio into a timed video segment.
#[async_trait]
pub trait SceneRenderer: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// Version string folded into render fingerprints.
    fn renderer_version(&self) -> &str;

    /// Compose `spec` into a segment at `dest`.
    async fn compose(
        &self,
        spec: &SceneComposition,
        dest: &Path,
    ) -> ProviderResult<RenderedSegment>;
}
