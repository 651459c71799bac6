//! Content fingerprints for cache addressing.
//!
//! A fingerprint is the SHA-256 of the inputs that determine an
//! artifact's bytes, hex-encoded. Each input field is hashed with a
//! length prefix so adjacent fields can never collide by concatenation
//! (e.g. `"ab" + "c"` vs `"a" + "bc"`).

use sha2::{Digest, Sha256};
use std::fmt;

use slidecast_models::{AssetRef, QualityPreset, Scene, StyleDefaults, StylePreset, VoiceSpec};

/// Hex-encoded SHA-256 content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an existing lowercase hex digest.
    pub fn from_hex(hex: impl Into<String>) -> crate::error::StoreResult<Self> {
        let hex = hex.into();
        if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(crate::error::StoreError::InvalidFingerprint(hex));
        }
        Ok(Self(hex.to_lowercase()))
    }

    /// The hex digest.
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental hasher with length-prefixed fields.
struct FieldHasher {
    sha: Sha256,
}

impl FieldHasher {
    fn new(domain: &str) -> Self {
        let mut hasher = Self { sha: Sha256::new() };
        hasher.field(domain.as_bytes());
        hasher
    }

    fn field(&mut self, bytes: &[u8]) {
        self.sha.update((bytes.len() as u64).to_le_bytes());
        self.sha.update(bytes);
    }

    fn text(&mut self, s: &str) {
        self.field(s.as_bytes());
    }

    fn float(&mut self, v: f64) {
        // Fixed formatting keeps equal values byte-identical
        self.field(format!("{v:.6}").as_bytes());
    }

    fn finish(self) -> Fingerprint {
        Fingerprint(hex::encode(self.sha.finalize()))
    }
}

/// Fingerprint for a scene's narration audio.
///
/// Covers the spoken text, the voice parameters, and the narration
/// chain's combined version string. Scene index and project identity are
/// deliberately excluded so identical text in different scenes or
/// projects shares one artifact.
pub fn narration_fingerprint(text: &str, voice: &VoiceSpec, chain_version: &str) -> Fingerprint {
    let mut h = FieldHasher::new("narration/v1");
    h.text(text);
    h.text(&voice.cache_key());
    h.text(chain_version);
    h.finish()
}

/// Fingerprint for a rendered scene segment.
///
/// Covers everything that shapes the segment's pixels and audio: scene
/// content, effective style, output quality, renderer version, and the
/// narration fingerprint (`None` when the segment is silent).
pub fn render_fingerprint(
    scene: &Scene,
    preset: StylePreset,
    style: &StyleDefaults,
    quality: QualityPreset,
    renderer_version: &str,
    narration: Option<&Fingerprint>,
) -> Fingerprint {
    let mut h = FieldHasher::new("render/v1");
    h.text(&scene.text);
    for asset in &scene.assets {
        hash_asset(&mut h, asset);
    }
    h.float(scene.duration_floor_secs.unwrap_or(0.0));
    h.text(preset.as_str());
    h.text(&style.background_color);
    h.text(&style.font);
    h.field(&(style.font_size as u64).to_le_bytes());
    h.text(&style.style_version);
    h.text(quality.as_str());
    h.text(renderer_version);
    h.text(narration.map(Fingerprint::as_hex).unwrap_or(""));
    h.finish()
}

/// Fingerprint for the exported final video.
///
/// Covers the ordered segment fingerprints, the cross-fade duration and
/// the export quality, so a job whose surviving segments are all cached
/// can reuse the final encode too.
pub fn final_fingerprint(
    segments: &[&Fingerprint],
    transition_secs: f64,
    quality: QualityPreset,
) -> Fingerprint {
    let mut h = FieldHasher::new("final/v1");
    for segment in segments {
        h.text(segment.as_hex());
    }
    h.float(transition_secs);
    h.text(quality.as_str());
    h.finish()
}

fn hash_asset(h: &mut FieldHasher, asset: &AssetRef) {
    h.text(&asset.path);
    h.float(asset.x);
    h.float(asset.y);
    h.float(asset.scale);
    h.float(asset.opacity);
    h.float(asset.timeline_offset_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice() -> VoiceSpec {
        VoiceSpec::new("en_1")
    }

    #[test]
    fn test_narration_fingerprint_is_deterministic() {
        let a = narration_fingerprint("Welcome", &voice(), "tts@1.0");
        let b = narration_fingerprint("Welcome", &voice(), "tts@1.0");
        assert_eq!(a, b);
        assert_eq!(a.as_hex().len(), 64);
    }

    #[test]
    fn test_narration_fingerprint_varies_with_inputs() {
        let base = narration_fingerprint("Welcome", &voice(), "tts@1.0");
        assert_ne!(base, narration_fingerprint("Welcome!", &voice(), "tts@1.0"));
        assert_ne!(
            base,
            narration_fingerprint("Welcome", &VoiceSpec::new("en_2"), "tts@1.0")
        );
        assert_ne!(base, narration_fingerprint("Welcome", &voice(), "tts@1.1"));

        let mut slow = voice();
        slow.rate = 0.8;
        assert_ne!(base, narration_fingerprint("Welcome", &slow, "tts@1.0"));

        let mut low = voice();
        low.pitch = -2.0;
        assert_ne!(base, narration_fingerprint("Welcome", &low, "tts@1.0"));
    }

    #[test]
    fn test_fields_are_length_prefixed() {
        // "ab" + "c" must differ from "a" + "bc"
        let a = narration_fingerprint("ab", &VoiceSpec::new("c"), "");
        let b = narration_fingerprint("a", &VoiceSpec::new("bc"), "");
        assert_ne!(a, b);
    }

    #[test]
    fn test_render_fingerprint_tracks_style_and_narration() {
        let scene = Scene::new(1, 0, "Agenda");
        let style = StyleDefaults::default();
        let narration = narration_fingerprint("Agenda", &voice(), "tts@1.0");

        let base = render_fingerprint(
            &scene,
            StylePreset::Minimal,
            &style,
            QualityPreset::Standard,
            "scene-graph-1",
            Some(&narration),
        );

        let bold = render_fingerprint(
            &scene,
            StylePreset::Bold,
            &style,
            QualityPreset::Standard,
            "scene-graph-1",
            Some(&narration),
        );
        assert_ne!(base, bold);

        let silent = render_fingerprint(
            &scene,
            StylePreset::Minimal,
            &style,
            QualityPreset::Standard,
            "scene-graph-1",
            None,
        );
        assert_ne!(base, silent);

        let upgraded = render_fingerprint(
            &scene,
            StylePreset::Minimal,
            &style,
            QualityPreset::Standard,
            "scene-graph-2",
            Some(&narration),
        );
        assert_ne!(base, upgraded);
    }

    #[test]
    fn test_final_fingerprint_order_sensitive() {
        let a = narration_fingerprint("first", &voice(), "v");
        let b = narration_fingerprint("second", &voice(), "v");
        let ab = final_fingerprint(&[&a, &b], 0.5, QualityPreset::Standard);
        let ba = final_fingerprint(&[&b, &a], 0.5, QualityPreset::Standard);
        assert_ne!(ab, ba);
        assert_ne!(ab, final_fingerprint(&[&a, &b], 0.0, QualityPreset::Standard));
    }

    #[test]
    fn test_from_hex_validation() {
        let fp = narration_fingerprint("x", &voice(), "v");
        assert!(Fingerprint::from_hex(fp.as_hex()).is_ok());
        assert!(Fingerprint::from_hex("nothex").is_err());
    }
}
