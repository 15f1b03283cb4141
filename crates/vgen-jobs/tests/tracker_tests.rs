//! End-to-end tracker scenarios driven through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use mockall::predicate::always;

use vgen_jobs::{
    AdapterError, JobError, JobTracker, Operation, OperationHandle, PollerConfig, TrackerConfig,
};
use vgen_models::{JobEvent, JobKind, JobState, PollOutcome};

/// Adapter that replays a fixed sequence of poll outcomes, then reports
/// "still running" forever.
struct SequenceOperation {
    kind: JobKind,
    outcomes: Mutex<Vec<Result<PollOutcome, AdapterError>>>,
    polls: AtomicUsize,
}

impl SequenceOperation {
    fn new(kind: JobKind, mut outcomes: Vec<Result<PollOutcome, AdapterError>>) -> Self {
        outcomes.reverse();
        Self {
            kind,
            outcomes: Mutex::new(outcomes),
            polls: AtomicUsize::new(0),
        }
    }

    fn never_done(kind: JobKind) -> Self {
        Self::new(kind, Vec::new())
    }
}

#[async_trait]
impl Operation for SequenceOperation {
    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn start(&self) -> Result<OperationHandle, AdapterError> {
        Ok(OperationHandle::new("seq-op"))
    }

    async fn poll(&self, _handle: &OperationHandle) -> Result<PollOutcome, AdapterError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        match self.outcomes.lock().unwrap().pop() {
            Some(outcome) => outcome,
            None => Ok(PollOutcome::pending(None)),
        }
    }

    async fn cancel(&self, _handle: &OperationHandle) -> Result<(), AdapterError> {
        Ok(())
    }
}

mock! {
    Op {}

    #[async_trait]
    impl Operation for Op {
        fn kind(&self) -> JobKind;
        async fn start(&self) -> Result<OperationHandle, AdapterError>;
        async fn poll(&self, handle: &OperationHandle) -> Result<PollOutcome, AdapterError>;
        async fn cancel(&self, handle: &OperationHandle) -> Result<(), AdapterError>;
    }
}

fn fast_tracker(max_attempts: u32) -> JobTracker {
    JobTracker::new(TrackerConfig {
        poller: PollerConfig {
            interval: Duration::from_secs(10),
            max_attempts,
        },
        ..Default::default()
    })
}

#[tokio::test(start_paused = true)]
async fn success_path_walks_pending_processing_completed() {
    let tracker = fast_tracker(60);
    let op = Arc::new(SequenceOperation::new(
        JobKind::VideoGenerate,
        vec![
            Ok(PollOutcome::pending(Some(30))),
            Ok(PollOutcome::pending(Some(60))),
            Ok(PollOutcome::completed("https://cdn/x.mp4")),
        ],
    ));

    let job = tracker.submit(op).await.unwrap();
    assert_eq!(job.state, JobState::Pending);

    let mut observed = vec![job.state];
    let mut last_progress = job.progress;
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        let snapshot = tracker.get(&job.id).await.unwrap();
        // Progress readings at increasing times never decrease
        assert!(snapshot.progress >= last_progress);
        last_progress = snapshot.progress;
        if observed.last() != Some(&snapshot.state) {
            observed.push(snapshot.state);
        }
    }

    assert_eq!(
        observed,
        vec![JobState::Pending, JobState::Processing, JobState::Completed]
    );

    let snapshot = tracker.get(&job.id).await.unwrap();
    assert_eq!(snapshot.result.as_deref(), Some("https://cdn/x.mp4"));
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.progress, 100);
}

#[tokio::test(start_paused = true)]
async fn provider_failure_is_preserved_verbatim() {
    let tracker = fast_tracker(60);
    let op = Arc::new(SequenceOperation::new(
        JobKind::VideoGenerate,
        vec![Ok(PollOutcome::failed("quota exceeded"))],
    ));

    let job = tracker.submit(op).await.unwrap();
    tokio::time::sleep(Duration::from_secs(15)).await;
    tokio::task::yield_now().await;

    let snapshot = tracker.get(&job.id).await.unwrap();
    assert_eq!(snapshot.state, JobState::Failed);
    assert_eq!(snapshot.error.as_deref(), Some("quota exceeded"));
    assert!(snapshot.result.is_none());
}

#[tokio::test(start_paused = true)]
async fn timeout_fires_after_exactly_max_attempts() {
    let tracker = fast_tracker(3);
    let op = Arc::new(SequenceOperation::never_done(JobKind::VideoGenerate));
    let polls = {
        let op = Arc::clone(&op);
        move || op.polls.load(Ordering::SeqCst)
    };

    let job = tracker.submit(Arc::clone(&op) as Arc<dyn Operation>).await.unwrap();

    // After 2 polls: still processing, never earlier than the budget
    tokio::time::sleep(Duration::from_secs(25)).await;
    tokio::task::yield_now().await;
    assert_eq!(polls(), 2);
    assert_eq!(
        tracker.get(&job.id).await.unwrap().state,
        JobState::Processing
    );

    // Third poll exhausts the budget
    tokio::time::sleep(Duration::from_secs(10)).await;
    tokio::task::yield_now().await;
    let snapshot = tracker.get(&job.id).await.unwrap();
    assert_eq!(snapshot.state, JobState::TimedOut);
    assert_eq!(snapshot.attempts, 3);
    assert!(snapshot.result.is_none());
    assert!(snapshot.error.as_deref().unwrap().contains("timed out"));

    // Never later either: no further polls happen
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(polls(), 3);
}

#[tokio::test(start_paused = true)]
async fn concurrent_jobs_reach_independent_terminal_states() {
    let tracker = fast_tracker(3);

    let winner = tracker
        .submit(Arc::new(SequenceOperation::new(
            JobKind::VideoGenerate,
            vec![
                Ok(PollOutcome::pending(Some(50))),
                Ok(PollOutcome::completed("https://cdn/winner.mp4")),
            ],
        )))
        .await
        .unwrap();
    let loser = tracker
        .submit(Arc::new(SequenceOperation::never_done(
            JobKind::MediaDownload,
        )))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(45)).await;
    tokio::task::yield_now().await;

    let won = tracker.get(&winner.id).await.unwrap();
    assert_eq!(won.state, JobState::Completed);
    assert_eq!(won.result.as_deref(), Some("https://cdn/winner.mp4"));
    assert!(won.error.is_none());

    let lost = tracker.get(&loser.id).await.unwrap();
    assert_eq!(lost.state, JobState::TimedOut);
    assert!(lost.result.is_none());
    assert!(lost.error.is_some());
    assert_eq!(lost.kind, JobKind::MediaDownload);
}

#[tokio::test(start_paused = true)]
async fn repeated_get_returns_identical_snapshots() {
    let tracker = fast_tracker(60);
    let op = Arc::new(SequenceOperation::new(
        JobKind::VideoGenerate,
        vec![Ok(PollOutcome::completed("https://cdn/x.mp4"))],
    ));

    let job = tracker.submit(op).await.unwrap();
    tokio::time::sleep(Duration::from_secs(15)).await;
    tokio::task::yield_now().await;

    let first = tracker.get(&job.id).await.unwrap();
    let second = tracker.get(&job.id).await.unwrap();
    assert_eq!(first.state, second.state);
    assert_eq!(first.progress, second.progress);
    assert_eq!(first.result, second.result);
    assert_eq!(first.updated_at, second.updated_at);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_polling_and_aborts_upstream_once() {
    let mut mock = MockOp::new();
    mock.expect_kind().return_const(JobKind::MediaDownload);
    mock.expect_start()
        .times(1)
        .returning(|| Ok(OperationHandle::new("dl-1")));
    mock.expect_poll()
        .with(always())
        .returning(|_| Ok(PollOutcome::pending(Some(10))));
    mock.expect_cancel()
        .times(1)
        .with(always())
        .returning(|_| Ok(()));

    let tracker = fast_tracker(60);
    let job = tracker.submit(Arc::new(mock)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(25)).await;
    tokio::task::yield_now().await;

    let cancelled = tracker.cancel(&job.id).await.unwrap();
    assert!(cancelled.state.is_terminal());
    assert_eq!(cancelled.error.as_deref(), Some("cancelled by client"));

    // Give the poller time to notice and exit; mock drop verifies the
    // single upstream cancel
    tokio::time::sleep(Duration::from_secs(60)).await;
    tokio::task::yield_now().await;
    assert_eq!(tracker.active_jobs().await, 0);
}

#[tokio::test(start_paused = true)]
async fn events_stream_until_terminal() {
    let tracker = fast_tracker(60);
    let op = Arc::new(SequenceOperation::new(
        JobKind::VideoGenerate,
        vec![
            Ok(PollOutcome::pending(Some(25))),
            Ok(PollOutcome::completed("https://cdn/x.mp4")),
        ],
    ));

    let job = tracker.submit(op).await.unwrap();
    let mut rx = tracker.hub().subscribe(&job.id).await;

    tokio::time::sleep(Duration::from_secs(25)).await;
    tokio::task::yield_now().await;

    let mut saw_progress = false;
    let mut terminal = None;
    while let Ok(event) = rx.try_recv() {
        match &event {
            JobEvent::Progress { value } => {
                assert_eq!(*value, 25);
                saw_progress = true;
            }
            JobEvent::Done { result, .. } => {
                terminal = Some(result.clone());
            }
            _ => {}
        }
    }

    assert!(saw_progress);
    assert_eq!(terminal.as_deref(), Some("https://cdn/x.mp4"));
}

#[tokio::test(start_paused = true)]
async fn busy_tracker_rejects_submissions() {
    let tracker = JobTracker::new(TrackerConfig {
        max_active: 2,
        ..Default::default()
    });

    for _ in 0..2 {
        tracker
            .submit(Arc::new(SequenceOperation::never_done(
                JobKind::VideoGenerate,
            )))
            .await
            .unwrap();
    }

    let err = tracker
        .submit(Arc::new(SequenceOperation::never_done(
            JobKind::VideoGenerate,
        )))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Busy { active: 2, max: 2 }));
}
