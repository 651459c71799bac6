//! File naming conventions for derived artifacts.
//!
//! These formats are load-bearing for compatibility with downstream
//! consumers and must not change shape.

use uuid::Uuid;

/// Per-scene narration file name: `scene_{index:03}_{uuid}.mp3`.
pub fn narration_file_name(scene_index: u32, id: &Uuid) -> String {
    format!("scene_{:03}_{}.mp3", scene_index, id)
}

/// Final video file name: `presentation_{uuid}.mp4`.
pub fn final_video_name(id: &Uuid) -> String {
    format!("presentation_{}.mp4", id)
}

/// Intermediate segment file name: the fingerprint hex as stem.
pub fn segment_file_name(fingerprint_hex: &str) -> String {
    format!("{}.mp4", fingerprint_hex)
}
