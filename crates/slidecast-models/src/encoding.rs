//! Output quality presets and encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Named output quality level with a fixed resolution/bitrate/fps table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    /// 854x480 @ 1 Mbps, 24 fps
    Draft,
    /// 1280x720 @ 2.5 Mbps, 30 fps
    #[default]
    Standard,
    /// 1920x1080 @ 5 Mbps, 30 fps
    High,
}

impl QualityPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPreset::Draft => "draft",
            QualityPreset::Standard => "standard",
            QualityPreset::High => "high",
        }
    }

    /// Output frame size (width, height).
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            QualityPreset::Draft => (854, 480),
            QualityPreset::Standard => (1280, 720),
            QualityPreset::High => (1920, 1080),
        }
    }

    /// Target video bitrate.
    pub fn video_bitrate(&self) -> &'static str {
        match self {
            QualityPreset::Draft => "1M",
            QualityPreset::Standard => "2500k",
            QualityPreset::High => "5M",
        }
    }

    /// Output frame rate.
    pub fn fps(&self) -> u32 {
        match self {
            QualityPreset::Draft => 24,
            QualityPreset::Standard | QualityPreset::High => 30,
        }
    }
}

impl std::fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(QualityPreset::Draft),
            "standard" => Ok(QualityPreset::Standard),
            "high" => Ok(QualityPreset::High),
            other => Err(format!("unknown quality preset: {other}")),
        }
    }
}

/// Video encoding configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Output quality preset (resolution/bitrate/fps)
    #[serde(default)]
    pub quality: QualityPreset,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            preset: default_preset(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            quality: QualityPreset::default(),
            extra_args: Vec::new(),
        }
    }
}

impl EncodingConfig {
    /// Create an encoding configuration for the given quality preset.
    pub fn for_quality(quality: QualityPreset) -> Self {
        Self {
            quality,
            ..Default::default()
        }
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let (width, height) = self.quality.resolution();
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-b:v".to_string(),
            self.quality.video_bitrate().to_string(),
            "-s".to_string(),
            format!("{}x{}", width, height),
            "-r".to_string(),
            self.quality.fps().to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-movflags".to_string(),
            "+faststart".to_string(),
        ];
        args.extend(self.extra_args.clone());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_table() {
        assert_eq!(QualityPreset::Draft.resolution(), (854, 480));
        assert_eq!(QualityPreset::Standard.resolution(), (1280, 720));
        assert_eq!(QualityPreset::High.resolution(), (1920, 1080));
        assert_eq!(QualityPreset::Draft.fps(), 24);
        assert_eq!(QualityPreset::High.fps(), 30);
    }

    #[test]
    fn test_ffmpeg_args() {
        let config = EncodingConfig::for_quality(QualityPreset::High);
        let args = config.to_ffmpeg_args();
        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"1920x1080".to_string()));
        assert!(args.contains(&"5M".to_string()));
    }

    #[test]
    fn test_preset_parse() {
        assert_eq!("high".parse::<QualityPreset>().unwrap(), QualityPreset::High);
        assert!("ultra".parse::<QualityPreset>().is_err());
    }
}
