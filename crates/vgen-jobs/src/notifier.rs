//! In-process progress events.
//!
//! Per-job broadcast channels. Jobs live and die inside this process, so a
//! broker is unnecessary; subscribers that connect after an event missed it
//! and should read the store snapshot first (the WS handler does).

use std::collections::HashMap;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use vgen_models::{JobEvent, JobId};

/// Events buffered per subscriber before lagging kicks in.
const CHANNEL_CAPACITY: usize = 64;

/// Publish/subscribe hub for job progress events.
#[derive(Default)]
pub struct ProgressHub {
    channels: RwLock<HashMap<JobId, broadcast::Sender<JobEvent>>>,
}

impl ProgressHub {
    /// Create a new hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events for a job.
    ///
    /// The channel is created on first use, so subscribing before the
    /// poller publishes anything is safe.
    pub async fn subscribe(&self, job_id: &JobId) -> broadcast::Receiver<JobEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(job_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event. Dropped silently when nobody ever subscribed.
    pub async fn publish(&self, job_id: &JobId, event: JobEvent) {
        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(job_id) {
            debug!(job_id = %job_id, event = event.event_type().as_str(), "Publishing job event");
            // Err means no live receivers, which is fine
            let _ = sender.send(event);
        }
    }

    /// Publish a log message.
    pub async fn log(&self, job_id: &JobId, message: impl Into<String>) {
        self.publish(job_id, JobEvent::log(message)).await;
    }

    /// Publish a progress update.
    pub async fn progress(&self, job_id: &JobId, value: u8) {
        self.publish(job_id, JobEvent::progress(value)).await;
    }

    /// Publish the terminal done event.
    pub async fn done(&self, job_id: &JobId, result: impl Into<String>) {
        self.publish(job_id, JobEvent::done(job_id.as_str(), result))
            .await;
    }

    /// Publish the terminal error event.
    pub async fn error(&self, job_id: &JobId, message: impl Into<String>) {
        self.publish(job_id, JobEvent::error(message)).await;
    }

    /// Drop a job's channel, disconnecting remaining receivers.
    pub async fn remove(&self, job_id: &JobId) {
        self.channels.write().await.remove(job_id);
    }

    /// Number of live channels.
    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.channels.read().await.is_empty()
    }
}
