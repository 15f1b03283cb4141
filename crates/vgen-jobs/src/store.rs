//! In-memory job registry.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use vgen_models::{Job, JobId, JobKind, JobPatch};

use crate::error::{JobError, JobResult};

/// Concurrent key-value registry of jobs.
///
/// Constructed once at process start and owned by the composition root;
/// handlers and pollers receive it by `Arc`, never through ambient global
/// state. Each job has exactly one active poller, so per-entry updates only
/// need the map guarded against concurrent insert/delete from other jobs.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate and register a new pending job.
    pub async fn create(&self, kind: JobKind) -> Job {
        let job = Job::new(kind);
        self.jobs
            .write()
            .await
            .insert(job.id.clone(), job.clone());
        debug!(job_id = %job.id, kind = %kind, "Job created");
        job
    }

    /// Read the current snapshot of a job.
    pub async fn get(&self, id: &JobId) -> JobResult<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::not_found(id.as_str()))
    }

    /// Apply a validated partial update.
    ///
    /// The read-modify-write happens under the write lock, so a patch is
    /// never interleaved with another update of the same entry.
    pub async fn update(&self, id: &JobId, patch: JobPatch) -> JobResult<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::not_found(id.as_str()))?;
        let updated = job.apply(patch)?;
        jobs.insert(id.clone(), updated.clone());
        Ok(updated)
    }

    /// Remove a job. Idempotent.
    pub async fn delete(&self, id: &JobId) {
        self.jobs.write().await.remove(id);
    }

    /// Remove terminal jobs whose last update is older than `retention`.
    ///
    /// Returns the ids of the removed jobs so callers can release
    /// per-job resources (progress channels).
    pub async fn sweep(&self, retention: Duration) -> Vec<JobId> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());

        let mut jobs = self.jobs.write().await;
        let expired: Vec<JobId> = jobs
            .iter()
            .filter(|(_, job)| job.state.is_terminal() && job.updated_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            jobs.remove(id);
        }

        if !expired.is_empty() {
            debug!(count = expired.len(), "Swept expired terminal jobs");
        }

        expired
    }

    /// Total number of registered jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Number of jobs not yet terminal.
    pub async fn active_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| !job.state.is_terminal())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgen_models::JobState;

    #[tokio::test]
    async fn test_create_and_get() {
        let store = JobStore::new();
        let job = store.create(JobKind::VideoGenerate).await;

        let fetched = store.get(&job.id).await.unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.state, JobState::Pending);
    }

    #[tokio::test]
    async fn test_get_unknown_id() {
        let store = JobStore::new();
        let err = store.get(&JobId::from_string("missing")).await.unwrap_err();
        assert!(matches!(err, JobError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_enforces_transitions() {
        let store = JobStore::new();
        let job = store.create(JobKind::MediaDownload).await;

        store.update(&job.id, JobPatch::processing()).await.unwrap();
        store
            .update(&job.id, JobPatch::failed("quota exceeded"))
            .await
            .unwrap();

        // Terminal is final
        let err = store
            .update(&job.id, JobPatch::progress(Some(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition(_)));

        let snapshot = store.get(&job.id).await.unwrap();
        assert_eq!(snapshot.state, JobState::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("quota exceeded"));
        assert!(snapshot.result.is_none());
    }

    #[tokio::test]
    async fn test_delete_idempotent() {
        let store = JobStore::new();
        let job = store.create(JobKind::VideoGenerate).await;

        store.delete(&job.id).await;
        store.delete(&job.id).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_sweep_only_removes_old_terminal_jobs() {
        let store = JobStore::new();

        let active = store.create(JobKind::VideoGenerate).await;
        let done = store.create(JobKind::VideoGenerate).await;
        store.update(&done.id, JobPatch::processing()).await.unwrap();
        store
            .update(&done.id, JobPatch::completed("https://cdn/x.mp4"))
            .await
            .unwrap();

        // Zero retention: terminal jobs are immediately eligible
        let swept = store.sweep(Duration::ZERO).await;
        assert_eq!(swept, vec![done.id.clone()]);
        assert!(store.get(&done.id).await.is_err());
        assert!(store.get(&active.id).await.is_ok());

        // Long retention keeps fresh terminal jobs around
        let done2 = store.create(JobKind::MediaDownload).await;
        store.update(&done2.id, JobPatch::processing()).await.unwrap();
        store
            .update(&done2.id, JobPatch::failed("boom"))
            .await
            .unwrap();
        let swept = store.sweep(Duration::from_secs(300)).await;
        assert!(swept.is_empty());
    }

    #[tokio::test]
    async fn test_active_count() {
        let store = JobStore::new();
        let a = store.create(JobKind::VideoGenerate).await;
        let _b = store.create(JobKind::VideoGenerate).await;

        store.update(&a.id, JobPatch::processing()).await.unwrap();
        store
            .update(&a.id, JobPatch::completed("url"))
            .await
            .unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(store.active_count().await, 1);
    }
}
