//! Background service reaping terminal jobs past their retention window.
//!
//! Terminal jobs stay readable for a while so clients can fetch the final
//! outcome after a reconnect; this sweeper removes them once the window
//! passes, keeping the in-memory store bounded.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::info;

use vgen_jobs::JobTracker;

use crate::metrics;

/// Retention sweeper service.
pub struct RetentionSweeper {
    tracker: Arc<JobTracker>,
    interval: Duration,
    enabled: bool,
}

impl RetentionSweeper {
    /// Create a new sweeper.
    pub fn new(tracker: Arc<JobTracker>, sweep_interval: Duration) -> Self {
        let enabled = std::env::var("ENABLE_RETENTION_SWEEP")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Self {
            tracker,
            interval: sweep_interval,
            enabled,
        }
    }

    /// Start the background sweep loop.
    ///
    /// Runs indefinitely and should be spawned as a background task.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Retention sweeping is disabled");
            return;
        }

        info!("Starting retention sweeper (interval: {:?})", self.interval);

        let mut ticker = interval(self.interval);
        ticker.tick().await; // immediate first tick

        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    /// Run a single sweep cycle.
    pub async fn sweep_once(&self) -> usize {
        let swept = self.tracker.sweep().await;
        if swept > 0 {
            metrics::record_jobs_swept(swept);
            info!("Retention sweep reaped {} terminal jobs", swept);
        }
        swept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgen_jobs::TrackerConfig;
    use vgen_models::{JobId, JobState};

    async fn terminal_job(tracker: &JobTracker) -> JobId {
        let job = tracker
            .store()
            .create(vgen_models::JobKind::VideoGenerate)
            .await;
        tracker
            .store()
            .update(&job.id, vgen_models::JobPatch::processing())
            .await
            .unwrap();
        tracker
            .store()
            .update(&job.id, vgen_models::JobPatch::failed("boom"))
            .await
            .unwrap();
        job.id
    }

    #[tokio::test]
    async fn test_sweep_respects_retention_window() {
        let tracker = Arc::new(JobTracker::new(TrackerConfig {
            retention: Duration::from_secs(300),
            ..Default::default()
        }));
        let id = terminal_job(&tracker).await;

        let sweeper = RetentionSweeper::new(Arc::clone(&tracker), Duration::from_secs(60));

        // Inside the retention window nothing is reaped
        assert_eq!(sweeper.sweep_once().await, 0);
        assert_eq!(tracker.get(&id).await.unwrap().state, JobState::Failed);
    }

    #[tokio::test]
    async fn test_sweep_reaps_past_retention() {
        let tracker = Arc::new(JobTracker::new(TrackerConfig {
            retention: Duration::ZERO,
            ..Default::default()
        }));
        let id = terminal_job(&tracker).await;

        let sweeper = RetentionSweeper::new(Arc::clone(&tracker), Duration::from_secs(60));
        assert_eq!(sweeper.sweep_once().await, 1);
        assert!(tracker.get(&id).await.is_err());
    }
}
