//! Scene and asset definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One unit of content that becomes one segment of the final video.
///
/// Scenes carry the extracted text, their visual assets and an optional
/// duration floor. Playback order is defined by `order_index`, which must
/// be contiguous and unique within a project.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// Scene identifier, unique within the project
    pub id: u32,

    /// Zero-based playback position within the project
    pub order_index: u32,

    /// Extracted text content; narrated and overlaid on the segment
    pub text: String,

    /// Visual assets composited over the background
    #[serde(default)]
    pub assets: Vec<AssetRef>,

    /// Style preset override for this scene (falls back to project default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_preset: Option<crate::project::StylePreset>,

    /// Minimum segment duration in seconds.
    ///
    /// The rendered segment lasts `max(narration duration, this floor)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_floor_secs: Option<f64>,
}

impl Scene {
    /// Create a scene with text content at the given position.
    pub fn new(id: u32, order_index: u32, text: impl Into<String>) -> Self {
        Self {
            id,
            order_index,
            text: text.into(),
            assets: Vec::new(),
            style_preset: None,
            duration_floor_secs: None,
        }
    }

    /// Set the duration floor.
    pub fn with_duration_floor(mut self, secs: f64) -> Self {
        self.duration_floor_secs = Some(secs);
        self
    }

    /// Add an asset reference.
    pub fn with_asset(mut self, asset: AssetRef) -> Self {
        self.assets.push(asset);
        self
    }

    /// True if the scene has narratable text after whitespace trimming.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Reference to an image or video clip placed on a scene.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssetRef {
    /// Path to the asset file
    pub path: String,

    /// Horizontal position as a fraction of frame width (0.0 = left edge)
    #[serde(default)]
    pub x: f64,

    /// Vertical position as a fraction of frame height (0.0 = top edge)
    #[serde(default)]
    pub y: f64,

    /// Uniform scale factor applied to the asset
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Opacity in `[0.0, 1.0]`
    #[serde(default = "default_opacity")]
    pub opacity: f64,

    /// Seconds into the segment timeline when the asset appears
    #[serde(default)]
    pub timeline_offset_secs: f64,
}

fn default_scale() -> f64 {
    1.0
}

fn default_opacity() -> f64 {
    1.0
}

impl AssetRef {
    /// Create an asset reference with default placement.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            x: 0.0,
            y: 0.0,
            scale: default_scale(),
            opacity: default_opacity(),
            timeline_offset_secs: 0.0,
        }
    }

    /// Set the position (fractions of frame size).
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Set the scale factor.
    pub fn scaled(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Set the opacity.
    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }
}

/// Narration voice parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VoiceSpec {
    /// Provider-specific voice identifier
    pub voice_id: String,

    /// Speaking rate multiplier (1.0 = normal)
    #[serde(default = "default_rate")]
    pub rate: f32,

    /// Pitch shift in semitones (0.0 = unchanged)
    #[serde(default)]
    pub pitch: f32,
}

fn default_rate() -> f32 {
    1.0
}

impl Default for VoiceSpec {
    fn default() -> Self {
        Self {
            voice_id: "default".to_string(),
            rate: default_rate(),
            pitch: 0.0,
        }
    }
}

impl VoiceSpec {
    /// Create a voice spec for the given voice identifier.
    pub fn new(voice_id: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            ..Default::default()
        }
    }

    /// Canonical string used in narration fingerprints.
    pub fn cache_key(&self) -> String {
        format!("{}:{:.3}:{:.3}", self.voice_id, self.rate, self.pitch)
    }
}
