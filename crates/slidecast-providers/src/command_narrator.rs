//! Subprocess-backed narration engine.
//!
//! Wraps an external TTS command line. The command is given as an argv
//! template with `{text}`, `{voice}` and `{output}` placeholders, e.g.
//! `["say-tts", "--voice", "{voice}", "--out", "{output}", "{text}"]`.
//!
//! Failure classification follows sysexits: exit code 75 (EX_TEMPFAIL)
//! reports a transient failure, any other non-zero exit is permanent.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use slidecast_models::VoiceSpec;

use crate::error::{ProviderError, ProviderResult};
use crate::narration::{NarrationAudio, NarrationProvider};

/// Exit code conventionally meaning "temporary failure, try again".
const EX_TEMPFAIL: i32 = 75;

/// Narration engine invoking an external TTS executable.
#[derive(Debug, Clone)]
pub struct CommandNarrator {
    name: String,
    version: String,
    argv_template: Vec<String>,
    timeout: Duration,
}

impl CommandNarrator {
    /// Create a narrator from an argv template.
    ///
    /// `argv_template[0]` is the executable; remaining entries may contain
    /// the `{text}`, `{voice}` and `{output}` placeholders.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        argv_template: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            argv_template,
            timeout: Duration::from_secs(120),
        }
    }

    /// Set the hard per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_argv(&self, text: &str, voice: &VoiceSpec, dest: &Path) -> Vec<String> {
        self.argv_template
            .iter()
            .map(|arg| {
                arg.replace("{text}", text)
                    .replace("{voice}", &voice.voice_id)
                    .replace("{output}", &dest.to_string_lossy())
            })
            .collect()
    }
}

#[async_trait]
impl NarrationProvider for CommandNarrator {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_version(&self) -> &str {
        &self.version
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSpec,
        dest: &Path,
    ) -> ProviderResult<NarrationAudio> {
        let argv = self.build_argv(text, voice, dest);
        let (exe, args) = argv
            .split_first()
            .ok_or_else(|| ProviderError::permanent("empty narration argv template"))?;

        which::which(exe)
            .map_err(|_| ProviderError::permanent(format!("TTS executable not found: {exe}")))?;

        debug!(engine = %self.name, exe = %exe, "Invoking TTS engine");

        let run = Command::new(exe)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code();
            warn!(engine = %self.name, code = ?code, "TTS engine failed: {}", stderr.trim());
            return Err(match code {
                Some(EX_TEMPFAIL) => {
                    ProviderError::transient(format!("{} reported temporary failure", self.name))
                }
                _ => ProviderError::permanent(format!(
                    "{} exited with {:?}: {}",
                    self.name,
                    code,
                    stderr.trim()
                )),
            });
        }

        if !dest.exists() {
            return Err(ProviderError::permanent(format!(
                "{} completed but produced no output file",
                self.name
            )));
        }

        let duration_secs = probe_audio_duration(dest).await?;
        Ok(NarrationAudio {
            path: dest.to_path_buf(),
            duration_secs,
        })
    }
}

/// Read an audio file's duration with ffprobe.
async fn probe_audio_duration(path: &Path) -> ProviderResult<f64> {
    which::which("ffprobe")
        .map_err(|_| ProviderError::permanent("ffprobe not found in PATH"))?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(ProviderError::permanent(format!(
            "ffprobe failed on {}",
            path.display()
        )));
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .map_err(|_| ProviderError::permanent("ffprobe returned no duration"))
}
