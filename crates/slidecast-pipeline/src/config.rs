//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use slidecast_models::QualityPreset;

/// Scheduler and stage-runner configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum jobs processed concurrently
    pub max_concurrent_jobs: usize,
    /// Maximum scenes processed in parallel within a single job
    pub max_scene_parallel: usize,
    /// Per-scene narration timeout
    pub narrate_timeout: Duration,
    /// Per-scene render timeout
    pub render_timeout: Duration,
    /// Concatenation and export timeout
    pub assemble_timeout: Duration,
    /// Retries after the initial attempt for transient failures
    pub max_retries: u32,
    /// Base delay before the first retry (grows 3x per attempt)
    pub retry_base_delay: Duration,
    /// Cross-fade duration between consecutive segments, in seconds
    pub transition_secs: f64,
    /// Output quality preset
    pub quality: QualityPreset,
    /// Scratch directory for per-job intermediate files
    pub work_dir: PathBuf,
    /// Artifact cache root
    pub store_dir: PathBuf,
    /// Durable job record directory
    pub state_dir: PathBuf,
    /// Directory where final videos are published
    pub output_dir: PathBuf,
    /// Maximum artifact age before eviction
    pub artifact_max_age: Duration,
    /// Maximum total artifact bytes before oldest-first eviction
    pub artifact_max_bytes: u64,
    /// How long terminal job records are kept
    pub job_retention: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_scene_parallel: default_scene_parallel(),
            narrate_timeout: Duration::from_secs(120),
            render_timeout: Duration::from_secs(300),
            assemble_timeout: Duration::from_secs(600),
            max_retries: 2,
            retry_base_delay: Duration::from_secs(1),
            transition_secs: 0.5,
            quality: QualityPreset::Standard,
            work_dir: PathBuf::from("/tmp/slidecast/work"),
            store_dir: PathBuf::from("/tmp/slidecast/store"),
            state_dir: PathBuf::from("/tmp/slidecast/state"),
            output_dir: PathBuf::from("/tmp/slidecast/out"),
            artifact_max_age: Duration::from_secs(7 * 24 * 3600),
            artifact_max_bytes: 20 * 1024 * 1024 * 1024,
            job_retention: Duration::from_secs(24 * 3600),
        }
    }
}

/// Half the available cores, at least one.
fn default_scene_parallel() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() / 2).max(1))
        .unwrap_or(1)
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("SLIDECAST_MAX_JOBS", defaults.max_concurrent_jobs),
            max_scene_parallel: env_parse(
                "SLIDECAST_MAX_SCENE_PARALLEL",
                defaults.max_scene_parallel,
            )
            .max(1),
            narrate_timeout: env_secs("SLIDECAST_NARRATE_TIMEOUT_SECS", defaults.narrate_timeout),
            render_timeout: env_secs("SLIDECAST_RENDER_TIMEOUT_SECS", defaults.render_timeout),
            assemble_timeout: env_secs(
                "SLIDECAST_ASSEMBLE_TIMEOUT_SECS",
                defaults.assemble_timeout,
            ),
            max_retries: env_parse("SLIDECAST_MAX_RETRIES", defaults.max_retries),
            retry_base_delay: env_secs(
                "SLIDECAST_RETRY_BASE_DELAY_SECS",
                defaults.retry_base_delay,
            ),
            transition_secs: env_parse("SLIDECAST_TRANSITION_SECS", defaults.transition_secs),
            quality: std::env::var("SLIDECAST_QUALITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.quality),
            work_dir: env_path("SLIDECAST_WORK_DIR", defaults.work_dir),
            store_dir: env_path("SLIDECAST_STORE_DIR", defaults.store_dir),
            state_dir: env_path("SLIDECAST_STATE_DIR", defaults.state_dir),
            output_dir: env_path("SLIDECAST_OUTPUT_DIR", defaults.output_dir),
            artifact_max_age: env_secs(
                "SLIDECAST_ARTIFACT_MAX_AGE_SECS",
                defaults.artifact_max_age,
            ),
            artifact_max_bytes: env_parse(
                "SLIDECAST_ARTIFACT_MAX_BYTES",
                defaults.artifact_max_bytes,
            ),
            job_retention: env_secs("SLIDECAST_JOB_RETENTION_SECS", defaults.job_retention),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_sane() {
        let config = PipelineConfig::default();
        assert!(config.max_scene_parallel >= 1);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_base_delay, Duration::from_secs(1));
        assert!((config.transition_secs - 0.5).abs() < f64::EPSILON);
    }
}
