//! In-process progress events.
//!
//! Jobs publish updates on a broadcast channel; any number of observers
//! (status pollers, log sinks, tests) may subscribe. Publishing never
//! blocks and silently drops events when nobody is listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use slidecast_models::{JobId, JobState};

/// One progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub job_id: JobId,
    pub state: JobState,
    /// Progress percentage (0-100)
    pub percent: u8,
    /// Scene index for scene-scoped events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn new(job_id: JobId, state: JobState, percent: u8) -> Self {
        Self {
            job_id,
            state,
            percent,
            scene_index: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_scene(mut self, scene_index: u32) -> Self {
        self.scene_index = Some(scene_index);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Broadcast channel for progress events.
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    tx: broadcast::Sender<ProgressUpdate>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressChannel {
    /// Create a channel buffering up to `capacity` undelivered events
    /// per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.tx.subscribe()
    }

    /// Publish an event. A send error only means there are no
    /// subscribers, which is fine.
    pub fn publish(&self, update: ProgressUpdate) {
        let _ = self.tx.send(update);
    }
}
