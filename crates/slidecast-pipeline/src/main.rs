//! Pipeline worker binary.
//!
//! Reads a project manifest (JSON), submits it to the scheduler and
//! follows the job to a terminal state. The TTS engine is configured as
//! an argv template via `SLIDECAST_TTS_CMD`, e.g.
//! `say-tts --voice {voice} --out {output} {text}`.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use slidecast_media::{check_ffmpeg, check_ffprobe, FfmpegAssembler, FfmpegSceneRenderer};
use slidecast_models::{JobState, Project};
use slidecast_pipeline::{JobScheduler, JobStore, PipelineConfig, StageRunner};
use slidecast_providers::{CommandNarrator, NarrationChain, NarrationProvider};
use slidecast_store::ArtifactStore;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("slidecast=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting slidecast-worker");

    if let Err(e) = check_ffmpeg().and_then(|_| check_ffprobe()) {
        error!("Media toolchain check failed: {}", e);
        std::process::exit(1);
    }

    let config = PipelineConfig::from_env();
    info!("Pipeline config: {:?}", config);

    let narration = match narration_chain_from_env(&config) {
        Ok(chain) => chain,
        Err(e) => {
            error!("Failed to configure narration: {}", e);
            std::process::exit(1);
        }
    };

    let store = match ArtifactStore::open(&config.store_dir).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open artifact store: {}", e);
            std::process::exit(1);
        }
    };

    let jobs = match JobStore::open(&config.state_dir).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open job store: {}", e);
            std::process::exit(1);
        }
    };

    let renderer = Arc::new(FfmpegSceneRenderer::new().with_timeout(config.render_timeout.as_secs()));
    let assembler = Arc::new(FfmpegAssembler::new().with_timeout(config.assemble_timeout.as_secs()));
    let runner = StageRunner::new(narration, renderer, assembler, store, config.clone());
    let scheduler = JobScheduler::new(runner, jobs, config);

    // Periodic cache and record eviction
    let maintenance = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.run_maintenance().await {
                    warn!("Maintenance pass failed: {}", e);
                }
            }
        })
    };

    let manifest = match std::env::var("SLIDECAST_PROJECT") {
        Ok(path) => path,
        Err(_) => {
            error!("SLIDECAST_PROJECT must point to a project manifest");
            std::process::exit(2);
        }
    };

    let project: Project = match tokio::fs::read(&manifest).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(p) => p,
            Err(e) => {
                error!("Invalid project manifest {}: {}", manifest, e);
                std::process::exit(2);
            }
        },
        Err(e) => {
            error!("Cannot read project manifest {}: {}", manifest, e);
            std::process::exit(2);
        }
    };

    let job_id = match scheduler.submit(project).await {
        Ok(id) => id,
        Err(e) => {
            error!("Submission rejected: {}", e);
            std::process::exit(2);
        }
    };
    info!(job_id = %job_id, "Job submitted, waiting for completion");

    // Ctrl-C cancels the running job instead of abandoning it
    let cancel_scheduler = scheduler.clone();
    let cancel_job_id = job_id.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal, cancelling job");
        if let Err(e) = cancel_scheduler.cancel(&cancel_job_id).await {
            warn!("Cancellation failed: {}", e);
        }
    });

    let mut events = scheduler.subscribe_progress();
    let terminal = loop {
        match events.recv().await {
            Ok(update) if update.job_id == job_id => {
                info!(
                    state = update.state.as_str(),
                    percent = update.percent,
                    scene = ?update.scene_index,
                    "Progress"
                );
                if update.state.is_terminal() {
                    break update.state;
                }
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "Progress events lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                error!("Progress channel closed unexpectedly");
                std::process::exit(1);
            }
        }
    };

    maintenance.abort();

    match terminal {
        JobState::Completed => {
            let snapshot = scheduler.status(&job_id).await.ok();
            let result = snapshot.and_then(|s| s.result_path);
            match result {
                Some(path) => info!(path = %path, "Final video published"),
                None => warn!("Job completed but no result path recorded"),
            }
        }
        JobState::Cancelled => {
            info!("Job cancelled");
            std::process::exit(130);
        }
        other => {
            let snapshot = scheduler.status(&job_id).await.ok();
            let message = snapshot
                .and_then(|s| s.error)
                .map(|e| e.to_string())
                .unwrap_or_else(|| other.as_str().to_string());
            error!("Job failed: {}", message);
            std::process::exit(1);
        }
    }
}

/// Build the narration chain from `SLIDECAST_TTS_CMD` and the optional
/// `SLIDECAST_TTS_FALLBACK_CMD`.
fn narration_chain_from_env(config: &PipelineConfig) -> Result<NarrationChain, String> {
    let primary = narrator_from_env("SLIDECAST_TTS_CMD", "tts", config)?
        .ok_or_else(|| "SLIDECAST_TTS_CMD is not set".to_string())?;

    let mut providers: Vec<Arc<dyn NarrationProvider>> = vec![Arc::new(primary)];
    if let Some(fallback) = narrator_from_env("SLIDECAST_TTS_FALLBACK_CMD", "tts-fallback", config)?
    {
        providers.push(Arc::new(fallback));
    }
    Ok(NarrationChain::new(providers))
}

fn narrator_from_env(
    key: &str,
    name: &str,
    config: &PipelineConfig,
) -> Result<Option<CommandNarrator>, String> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    let argv: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    if argv.is_empty() {
        return Err(format!("{key} is empty"));
    }
    let version = std::env::var(format!("{key}_VERSION")).unwrap_or_else(|_| "1".to_string());
    Ok(Some(
        CommandNarrator::new(name, version, argv).with_timeout(config.narrate_timeout),
    ))
}
