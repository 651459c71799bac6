//! Project definitions and validation.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::scene::{Scene, VoiceSpec};

/// Unique identifier for a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    /// Generate a new random project ID.
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

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Visual style preset applied to scene backgrounds and text overlays.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum StylePreset {
    /// Plain background, centered text
    #[default]
    Minimal,
    /// Dark background with a title bar
    Classic,
    /// High-contrast background with large text
    Bold,
}

impl StylePreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            StylePreset::Minimal => "minimal",
            StylePreset::Classic => "classic",
            StylePreset::Bold => "bold",
        }
    }
}

impl fmt::Display for StylePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Project-wide style defaults applied to scenes without overrides.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StyleDefaults {
    /// Default visual preset
    #[serde(default)]
    pub preset: StylePreset,

    /// Background color (hex, e.g. "#1e1e2e") used when a scene has no
    /// background asset
    #[serde(default = "default_background")]
    pub background_color: String,

    /// Font family name passed to the renderer
    #[serde(default = "default_font")]
    pub font: String,

    /// Base font size in points
    #[serde(default = "default_font_size")]
    pub font_size: u32,

    /// Narration voice
    #[serde(default)]
    pub voice: VoiceSpec,

    /// Version tag of the style definitions, part of render fingerprints.
    ///
    /// Bumping this invalidates cached segments after a style change.
    #[serde(default = "default_style_version")]
    pub style_version: String,
}

fn default_background() -> String {
    "#101418".to_string()
}

fn default_font() -> String {
    "DejaVu Sans".to_string()
}

fn default_font_size() -> u32 {
    42
}

fn default_style_version() -> String {
    "v1".to_string()
}

impl Default for StyleDefaults {
    fn default() -> Self {
        Self {
            preset: StylePreset::default(),
            background_color: default_background(),
            font: default_font(),
            font_size: default_font_size(),
            voice: VoiceSpec::default(),
            style_version: default_style_version(),
        }
    }
}

/// An ordered set of scenes plus global style defaults.
///
/// Projects are immutable once a job starts; editing requires submitting a
/// new job for the edited project.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct Project {
    /// Unique project ID
    pub id: ProjectId,

    /// Ordered scenes; order is defined by `Scene::order_index`
    #[validate(custom(function = "validate_scene_list"))]
    pub scenes: Vec<Scene>,

    /// Global style defaults
    #[serde(default)]
    pub style: StyleDefaults,
}

impl Project {
    /// Create a project from a scene list with default style.
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self {
            id: ProjectId::new(),
            scenes,
            style: StyleDefaults::default(),
        }
    }

    /// Set the style defaults.
    pub fn with_style(mut self, style: StyleDefaults) -> Self {
        self.style = style;
        self
    }

    /// Scenes in playback order (ascending `order_index`).
    pub fn ordered_scenes(&self) -> Vec<&Scene> {
        let mut scenes: Vec<&Scene> = self.scenes.iter().collect();
        scenes.sort_by_key(|s| s.order_index);
        scenes
    }

    /// Effective style preset for a scene (scene override or project default).
    pub fn preset_for(&self, scene: &Scene) -> StylePreset {
        scene.style_preset.unwrap_or(self.style.preset)
    }
}

/// Scene-list invariants: at least one scene with non-empty text, contiguous
/// and unique order indices starting at zero, positive duration floors.
fn validate_scene_list(scenes: &[Scene]) -> Result<(), ValidationError> {
    if !scenes.iter().any(|s| s.has_text()) {
        return Err(ValidationError::new("no_extractable_text")
            .with_message("project has no scene with non-empty text".into()));
    }

    let mut indices: Vec<u32> = scenes.iter().map(|s| s.order_index).collect();
    indices.sort_unstable();
    for (expected, actual) in indices.iter().enumerate() {
        if *actual != expected as u32 {
            return Err(ValidationError::new("order_indices")
                .with_message("scene order indices must be contiguous and unique".into()));
        }
    }

    for scene in scenes {
        if let Some(floor) = scene.duration_floor_secs {
            if floor <= 0.0 || !floor.is_finite() {
                return Err(ValidationError::new("duration_floor")
                    .with_message("scene duration floor must be positive".into()));
            }
        }
    }

    Ok(())
}
