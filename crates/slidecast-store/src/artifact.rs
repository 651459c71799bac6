//! Artifact records and on-disk layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What an artifact contains, which also determines its directory and
/// file extension under the store root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Narration audio for one scene
    Audio,
    /// Rendered per-scene video segment
    VideoSegment,
    /// Exported final video
    FinalVideo,
}

impl ArtifactKind {
    /// Subdirectory under the store root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::VideoSegment => "segments",
            Self::FinalVideo => "final",
        }
    }

    /// File extension for the artifact payload.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Audio => "mp3",
            Self::VideoSegment | Self::FinalVideo => "mp4",
        }
    }
}

/// A cached artifact plus the metadata kept in its `.json` sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Hex content fingerprint
    pub fingerprint: String,
    /// Payload kind
    pub kind: ArtifactKind,
    /// Payload path under the store root
    pub path: PathBuf,
    /// Payload size in bytes
    pub size_bytes: u64,
    /// Media duration, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// When the artifact was produced
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Sidecar metadata path for a payload path.
    pub fn sidecar_path(payload: &Path) -> PathBuf {
        let mut name = payload.file_name().unwrap_or_default().to_os_string();
        name.push(".json");
        payload.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_layout() {
        assert_eq!(ArtifactKind::Audio.dir_name(), "audio");
        assert_eq!(ArtifactKind::Audio.extension(), "mp3");
        assert_eq!(ArtifactKind::VideoSegment.extension(), "mp4");
    }

    #[test]
    fn test_sidecar_path_keeps_payload_extension() {
        let sidecar = Artifact::sidecar_path(Path::new("/store/audio/abc.mp3"));
        assert_eq!(sidecar, PathBuf::from("/store/audio/abc.mp3.json"));
    }
}
