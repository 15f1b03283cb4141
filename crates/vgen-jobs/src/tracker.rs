//! Job tracker composition root.
//!
//! Owns the store, the progress hub and the polling schedule. Constructed
//! once at process start; everything downstream receives it by `Arc`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::info;

use vgen_models::{Job, JobId, JobPatch};

use crate::adapter::Operation;
use crate::error::{JobError, JobResult};
use crate::notifier::ProgressHub;
use crate::poller::{self, PollContext, PollerConfig};
use crate::store::JobStore;

/// Tracker configuration. All knobs are env-tunable, none are embedded
/// constants.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Poll schedule (interval + attempt cap)
    pub poller: PollerConfig,
    /// How long terminal jobs are kept for status reads before the sweeper
    /// reaps them
    pub retention: Duration,
    /// Ceiling on concurrently active jobs; excess creations are rejected
    pub max_active: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            retention: Duration::from_secs(300),
            max_active: 64,
        }
    }
}

impl TrackerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poller: PollerConfig {
                interval: Duration::from_secs(
                    env_parse("TRACKER_POLL_INTERVAL_SECS")
                        .unwrap_or(defaults.poller.interval.as_secs()),
                ),
                max_attempts: env_parse("TRACKER_MAX_POLL_ATTEMPTS")
                    .unwrap_or(defaults.poller.max_attempts),
            },
            retention: Duration::from_secs(
                env_parse("TRACKER_RETENTION_SECS").unwrap_or(defaults.retention.as_secs()),
            ),
            max_active: env_parse("TRACKER_MAX_ACTIVE_JOBS").unwrap_or(defaults.max_active),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Tracks asynchronous jobs wrapping external operations.
pub struct JobTracker {
    store: Arc<JobStore>,
    hub: Arc<ProgressHub>,
    config: TrackerConfig,
    limiter: Arc<Semaphore>,
    active: Arc<RwLock<HashMap<JobId, CancellationToken>>>,
}

impl JobTracker {
    /// Create a new tracker.
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            store: Arc::new(JobStore::new()),
            hub: Arc::new(ProgressHub::new()),
            limiter: Arc::new(Semaphore::new(config.max_active)),
            active: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn hub(&self) -> &Arc<ProgressHub> {
        &self.hub
    }

    /// Accept a new job and spawn its poller.
    ///
    /// Returns the pending snapshot immediately; the caller never waits for
    /// the external operation.
    pub async fn submit(&self, op: Arc<dyn Operation>) -> JobResult<Job> {
        let permit = match Arc::clone(&self.limiter).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                return Err(JobError::Busy {
                    active: self.config.max_active - self.limiter.available_permits(),
                    max: self.config.max_active,
                })
            }
        };

        let job = self.store.create(op.kind()).await;
        let token = CancellationToken::new();
        self.active
            .write()
            .await
            .insert(job.id.clone(), token.clone());

        info!(job_id = %job.id, kind = %job.kind, "Job accepted");

        let ctx = PollContext {
            store: Arc::clone(&self.store),
            hub: Arc::clone(&self.hub),
            job_id: job.id.clone(),
            config: self.config.poller,
            cancel: token,
        };
        let active = Arc::clone(&self.active);
        let job_id = job.id.clone();

        tokio::spawn(async move {
            poller::drive(ctx, op).await;
            active.write().await.remove(&job_id);
            drop(permit);
        });

        Ok(job)
    }

    /// Current snapshot of a job.
    pub async fn get(&self, id: &JobId) -> JobResult<Job> {
        self.store.get(id).await
    }

    /// Request best-effort cancellation.
    ///
    /// The local job is finalized immediately so the caller always gets a
    /// terminal snapshot back; the poller aborts the upstream operation on
    /// its way out. Cancelling an already-terminal job is a no-op.
    pub async fn cancel(&self, id: &JobId) -> JobResult<Job> {
        let job = self.store.get(id).await?;
        if job.state.is_terminal() {
            return Ok(job);
        }

        if let Some(token) = self.active.read().await.get(id).cloned() {
            token.cancel();
        }

        match self
            .store
            .update(id, JobPatch::failed("cancelled by client"))
            .await
        {
            Ok(job) => {
                self.hub.error(id, "cancelled by client").await;
                info!(job_id = %id, "Job cancelled");
                Ok(job)
            }
            // The poller finalized first; its snapshot wins
            Err(JobError::InvalidTransition(_)) => self.store.get(id).await,
            Err(e) => Err(e),
        }
    }

    /// Remove a job entirely. Idempotent.
    pub async fn delete(&self, id: &JobId) {
        if let Some(token) = self.active.write().await.remove(id) {
            token.cancel();
        }
        self.store.delete(id).await;
        self.hub.remove(id).await;
    }

    /// Reap terminal jobs past the retention window.
    pub async fn sweep(&self) -> usize {
        let expired = self.store.sweep(self.config.retention).await;
        for id in &expired {
            self.hub.remove(id).await;
        }
        expired.len()
    }

    /// Number of jobs currently being polled.
    pub async fn active_jobs(&self) -> usize {
        self.active.read().await.len()
    }
}
