//! Content-addressed artifact store with single-flight production.
//!
//! Artifacts live under `<root>/<kind>/<fingerprint>.<ext>` with a JSON
//! sidecar per payload. `put_with` guarantees at most one producer runs
//! per fingerprint inside this process; concurrent callers for the same
//! fingerprint wait and then reuse the winner's artifact.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::artifact::{Artifact, ArtifactKind};
use crate::error::{PutError, StoreError, StoreResult};
use crate::fingerprint::Fingerprint;

/// Counters from an eviction pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct PurgeStats {
    pub removed: usize,
    pub removed_bytes: u64,
    pub kept: usize,
}

/// Content-addressed cache of narration audio, scene segments and final
/// videos.
#[derive(Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ArtifactStore {
    /// Open a store rooted at `root`, creating the layout if needed.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for kind in [
            ArtifactKind::Audio,
            ArtifactKind::VideoSegment,
            ArtifactKind::FinalVideo,
        ] {
            fs::create_dir_all(root.join(kind.dir_name())).await?;
        }
        Ok(Self {
            root,
            locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Payload path for a fingerprint.
    pub fn payload_path(&self, fingerprint: &Fingerprint, kind: ArtifactKind) -> PathBuf {
        self.root
            .join(kind.dir_name())
            .join(format!("{}.{}", fingerprint.as_hex(), kind.extension()))
    }

    /// Look up a cached artifact. Returns `None` when either the payload
    /// or its sidecar is missing.
    pub async fn get(
        &self,
        fingerprint: &Fingerprint,
        kind: ArtifactKind,
    ) -> StoreResult<Option<Artifact>> {
        let payload = self.payload_path(fingerprint, kind);
        let sidecar = Artifact::sidecar_path(&payload);

        if !payload.exists() || !sidecar.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&sidecar).await?;
        match serde_json::from_slice::<Artifact>(&bytes) {
            Ok(artifact) => Ok(Some(artifact)),
            Err(e) => {
                // A torn sidecar means the entry is unusable; treat as a miss
                warn!(
                    fingerprint = fingerprint.as_hex(),
                    error = %e,
                    "Discarding artifact with unreadable sidecar"
                );
                let _ = fs::remove_file(&sidecar).await;
                let _ = fs::remove_file(&payload).await;
                Ok(None)
            }
        }
    }

    /// Get the artifact for `fingerprint`, producing it if absent.
    ///
    /// The producer receives a staging path and must write the complete
    /// payload there, returning the media duration when it knows one.
    /// The store then publishes the payload with an atomic rename and
    /// writes the sidecar. Returns the artifact and whether this call
    /// actually ran the producer.
    pub async fn put_with<E, F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        kind: ArtifactKind,
        produce: F,
    ) -> Result<(Artifact, bool), PutError<E>>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<Option<f64>, E>>,
    {
        // Fast path, no lock
        if let Some(artifact) = self.get(fingerprint, kind).await? {
            debug!(fingerprint = fingerprint.as_hex(), "Artifact cache hit");
            return Ok((artifact, false));
        }

        let (flight_key, flight) = self.flight_lock(fingerprint, kind).await;
        let guard = flight.lock().await;

        // Another caller may have produced it while we waited
        if let Some(artifact) = self.get(fingerprint, kind).await? {
            debug!(
                fingerprint = fingerprint.as_hex(),
                "Artifact produced by concurrent caller"
            );
            return Ok((artifact, false));
        }

        let payload = self.payload_path(fingerprint, kind);
        let staging = payload.with_extension(format!("{}.part", kind.extension()));

        let duration_secs = match produce(staging.clone()).await {
            Ok(d) => d,
            Err(e) => {
                let _ = fs::remove_file(&staging).await;
                return Err(PutError::Producer(e));
            }
        };

        if !staging.exists() {
            return Err(StoreError::MissingOutput(staging).into());
        }

        let size_bytes = fs::metadata(&staging).await.map_err(StoreError::from)?.len();
        fs::rename(&staging, &payload)
            .await
            .map_err(StoreError::from)?;

        let artifact = Artifact {
            fingerprint: fingerprint.as_hex().to_string(),
            kind,
            path: payload.clone(),
            size_bytes,
            duration_secs,
            created_at: Utc::now(),
        };
        self.write_sidecar(&artifact).await?;

        // Published: later callers hit the fast path, so the lock entry
        // can go. Waiters already hold their own Arc to it.
        drop(guard);
        self.locks.lock().await.remove(&flight_key);

        info!(
            fingerprint = fingerprint.as_hex(),
            size_bytes, "Stored new artifact"
        );
        Ok((artifact, true))
    }

    /// Remove artifacts older than `max_age`, then trim oldest-first
    /// until the store fits in `max_total_bytes`.
    pub async fn purge(&self, max_age: Duration, max_total_bytes: u64) -> StoreResult<PurgeStats> {
        let mut entries = self.scan().await?;
        entries.sort_by_key(|a| a.created_at);

        let now = Utc::now();
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let mut stats = PurgeStats::default();
        let mut survivors = Vec::new();

        for artifact in entries {
            if now - artifact.created_at > max_age {
                self.remove(&artifact).await;
                stats.removed += 1;
                stats.removed_bytes += artifact.size_bytes;
            } else {
                survivors.push(artifact);
            }
        }

        let mut total: u64 = survivors.iter().map(|a| a.size_bytes).sum();
        let mut kept = Vec::new();
        let mut survivors = survivors.into_iter();
        // survivors are oldest first
        for artifact in survivors.by_ref() {
            if total <= max_total_bytes {
                kept.push(artifact);
                break;
            }
            total -= artifact.size_bytes;
            self.remove(&artifact).await;
            stats.removed += 1;
            stats.removed_bytes += artifact.size_bytes;
        }
        kept.extend(survivors);

        stats.kept = kept.len();
        if stats.removed > 0 {
            info!(
                removed = stats.removed,
                removed_bytes = stats.removed_bytes,
                kept = stats.kept,
                "Purged artifact store"
            );
        }
        Ok(stats)
    }

    /// Total payload bytes currently stored.
    pub async fn total_bytes(&self) -> StoreResult<u64> {
        Ok(self.scan().await?.iter().map(|a| a.size_bytes).sum())
    }

    async fn flight_lock(
        &self,
        fingerprint: &Fingerprint,
        kind: ArtifactKind,
    ) -> (String, Arc<Mutex<()>>) {
        let key = format!("{}/{}", kind.dir_name(), fingerprint.as_hex());
        let mut locks = self.locks.lock().await;
        let lock = locks.entry(key.clone()).or_default().clone();
        (key, lock)
    }

    #[cfg(test)]
    async fn flight_locks_len(&self) -> usize {
        self.locks.lock().await.len()
    }

    async fn write_sidecar(&self, artifact: &Artifact) -> StoreResult<()> {
        let sidecar = Artifact::sidecar_path(&artifact.path);
        let staging = sidecar.with_extension("json.part");
        let bytes = serde_json::to_vec_pretty(artifact)?;
        fs::write(&staging, bytes).await?;
        fs::rename(&staging, &sidecar).await?;
        Ok(())
    }

    async fn scan(&self) -> StoreResult<Vec<Artifact>> {
        let mut artifacts = Vec::new();
        for kind in [
            ArtifactKind::Audio,
            ArtifactKind::VideoSegment,
            ArtifactKind::FinalVideo,
        ] {
            let dir = self.root.join(kind.dir_name());
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let bytes = fs::read(&path).await?;
                if let Ok(artifact) = serde_json::from_slice::<Artifact>(&bytes) {
                    artifacts.push(artifact);
                }
            }
        }
        Ok(artifacts)
    }

    async fn remove(&self, artifact: &Artifact) {
        let _ = fs::remove_file(&artifact.path).await;
        let _ = fs::remove_file(Artifact::sidecar_path(&artifact.path)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::narration_fingerprint;
    use slidecast_models::VoiceSpec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn fp(text: &str) -> Fingerprint {
        narration_fingerprint(text, &VoiceSpec::default(), "test@1")
    }

    async fn store(dir: &TempDir) -> ArtifactStore {
        ArtifactStore::open(dir.path()).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let fingerprint = fp("hello");

        let (artifact, produced) = store
            .put_with::<StoreError, _, _>(&fingerprint, ArtifactKind::Audio, |staging| async move {
                fs::write(&staging, b"mp3 bytes").await?;
                Ok(Some(2.5))
            })
            .await
            .unwrap();

        assert!(produced);
        assert_eq!(artifact.size_bytes, 9);
        assert_eq!(artifact.duration_secs, Some(2.5));

        let cached = store
            .get(&fingerprint, ArtifactKind::Audio)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.fingerprint, fingerprint.as_hex());
        assert!(cached.path.exists());
    }

    #[tokio::test]
    async fn test_put_with_runs_producer_at_most_once() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let fingerprint = fp("contended");
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let fingerprint = fingerprint.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                store
                    .put_with::<StoreError, _, _>(
                        &fingerprint,
                        ArtifactKind::VideoSegment,
                        |staging| async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            fs::write(&staging, b"segment").await?;
                            Ok(None)
                        },
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut produced_count = 0;
        for handle in handles {
            let (_, produced) = handle.await.unwrap();
            if produced {
                produced_count += 1;
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(produced_count, 1);
        assert_eq!(store.flight_locks_len().await, 0);
    }

    #[tokio::test]
    async fn test_flight_lock_released_after_publication() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        for name in ["first", "second", "third"] {
            let fingerprint = fp(name);
            store
                .put_with::<StoreError, _, _>(&fingerprint, ArtifactKind::Audio, |staging| async move {
                    fs::write(&staging, b"mp3").await?;
                    Ok(None)
                })
                .await
                .unwrap();
        }
        // One entry per distinct fingerprint would otherwise accumulate
        assert_eq!(store.flight_locks_len().await, 0);

        // Cache hits take the fast path and never create an entry
        let (_, produced) = store
            .put_with::<StoreError, _, _>(&fp("first"), ArtifactKind::Audio, |_| async move {
                Ok(None)
            })
            .await
            .unwrap();
        assert!(!produced);
        assert_eq!(store.flight_locks_len().await, 0);
    }

    #[tokio::test]
    async fn test_producer_failure_leaves_no_artifact() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let fingerprint = fp("failing");

        let result = store
            .put_with(&fingerprint, ArtifactKind::Audio, |_staging| async move {
                Err::<Option<f64>, _>(std::io::Error::other("synthesizer crashed"))
            })
            .await;

        assert!(matches!(result, Err(PutError::Producer(_))));
        assert!(store
            .get(&fingerprint, ArtifactKind::Audio)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_purge_by_size_removes_oldest_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        for (i, name) in ["old", "mid", "new"].iter().enumerate() {
            let fingerprint = fp(name);
            store
                .put_with::<StoreError, _, _>(&fingerprint, ArtifactKind::Audio, |staging| async move {
                    fs::write(&staging, vec![0u8; 100]).await?;
                    Ok(None)
                })
                .await
                .unwrap();
            // Distinct created_at ordering
            if i < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        // Fit two artifacts, drop the oldest
        let stats = store.purge(Duration::from_secs(3600), 200).await.unwrap();
        assert_eq!(stats.removed, 1);
        assert_eq!(stats.kept, 2);

        assert!(store.get(&fp("old"), ArtifactKind::Audio).await.unwrap().is_none());
        assert!(store.get(&fp("new"), ArtifactKind::Audio).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_by_age() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        let fingerprint = fp("aging");

        store
            .put_with::<StoreError, _, _>(&fingerprint, ArtifactKind::Audio, |staging| async move {
                fs::write(&staging, b"x").await?;
                Ok(None)
            })
            .await
            .unwrap();

        let stats = store.purge(Duration::ZERO, u64::MAX).await.unwrap();
        assert_eq!(stats.removed, 1);
        assert!(store
            .get(&fingerprint, ArtifactKind::Audio)
            .await
            .unwrap()
            .is_none());
    }
}
