//! Durable job records.
//!
//! Each job is one JSON file under `state_dir/jobs/{job_id}.json`,
//! written to a temp name and renamed so a crash never leaves a torn
//! record. An in-memory cache fronts the files; it is loaded once at
//! startup and kept in sync by `save`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

use slidecast_models::{Job, JobId, JobSnapshot};

use crate::error::PipelineResult;

/// Persistent store of job records.
#[derive(Clone)]
pub struct JobStore {
    dir: PathBuf,
    cache: Arc<RwLock<HashMap<String, Job>>>,
}

impl JobStore {
    /// Open the store, loading any records left by a previous run.
    pub async fn open(state_dir: impl Into<PathBuf>) -> PipelineResult<Self> {
        let dir = state_dir.into().join("jobs");
        fs::create_dir_all(&dir).await?;

        let mut cache = HashMap::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            match serde_json::from_slice::<Job>(&bytes) {
                Ok(job) => {
                    cache.insert(job.id.to_string(), job);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable job record");
                }
            }
        }

        if !cache.is_empty() {
            info!(count = cache.len(), "Loaded job records");
        }

        Ok(Self {
            dir,
            cache: Arc::new(RwLock::new(cache)),
        })
    }

    /// Persist a job record and refresh the cache.
    pub async fn save(&self, job: &Job) -> PipelineResult<()> {
        let path = self.record_path(&job.id);
        let staging = path.with_extension("json.part");

        let bytes = serde_json::to_vec_pretty(job)?;
        fs::write(&staging, bytes).await?;
        fs::rename(&staging, &path).await?;

        self.cache
            .write()
            .await
            .insert(job.id.to_string(), job.clone());
        Ok(())
    }

    /// Fetch a job by ID.
    pub async fn get(&self, job_id: &JobId) -> Option<Job> {
        self.cache.read().await.get(job_id.as_str()).cloned()
    }

    /// Snapshots of all known jobs, newest first.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> = self
            .cache
            .read()
            .await
            .values()
            .map(Job::snapshot)
            .collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        snapshots
    }

    /// Remove terminal jobs whose last update is older than `retention`.
    pub async fn purge_terminal(&self, retention: Duration) -> PipelineResult<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);

        let expired: Vec<JobId> = self
            .cache
            .read()
            .await
            .values()
            .filter(|j| j.state.is_terminal() && j.updated_at < cutoff)
            .map(|j| j.id.clone())
            .collect();

        for job_id in &expired {
            let _ = fs::remove_file(self.record_path(job_id)).await;
            self.cache.write().await.remove(job_id.as_str());
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Purged terminal job records");
        }
        Ok(expired.len())
    }

    fn record_path(&self, job_id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.json", job_id.as_str()))
    }
}
