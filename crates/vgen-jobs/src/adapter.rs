//! Uniform contract over slow external operations.
//!
//! Every provider (generation API, CLI downloader) is wrapped behind the
//! same start/poll/cancel surface so the poller never knows which kind of
//! operation it is driving.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use vgen_models::{JobKind, PollOutcome};

/// Opaque handle to a started external operation.
///
/// For a remote API this is the provider's operation id; for a subprocess
/// it is a token the adapter uses to find the child internally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationHandle(pub String);

impl OperationHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Infrastructure failure inside an adapter.
///
/// These are distinct from the external operation itself failing, which is
/// reported through [`PollOutcome::failed`].
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("start failed: {0}")]
    Start(String),

    #[error("poll failed: {0}")]
    Poll(String),

    #[error("cancel failed: {0}")]
    Cancel(String),
}

impl AdapterError {
    pub fn start(msg: impl Into<String>) -> Self {
        Self::Start(msg.into())
    }

    pub fn poll(msg: impl Into<String>) -> Self {
        Self::Poll(msg.into())
    }

    pub fn cancel(msg: impl Into<String>) -> Self {
        Self::Cancel(msg.into())
    }
}

/// One slow external operation behind a uniform start/poll/cancel contract.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Which job kind this operation maps to.
    fn kind(&self) -> JobKind;

    /// Begin the external operation. Must not block beyond a short
    /// submission timeout.
    async fn start(&self) -> Result<OperationHandle, AdapterError>;

    /// Check external state once. Idempotent, side-effect-free beyond the
    /// check itself; "not yet done" is a normal `Ok`.
    async fn poll(&self, handle: &OperationHandle) -> Result<PollOutcome, AdapterError>;

    /// Best-effort abort of the external operation. Many providers have no
    /// cancel primitive; the local job is finalized regardless.
    async fn cancel(&self, handle: &OperationHandle) -> Result<(), AdapterError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted adapter used across the crate's tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Adapter that replays a fixed script of poll outcomes.
    pub struct ScriptedOperation {
        kind: JobKind,
        script: Mutex<Vec<Result<PollOutcome, AdapterError>>>,
        pub polls: AtomicUsize,
        pub cancels: AtomicUsize,
        start_error: Option<String>,
    }

    impl ScriptedOperation {
        pub fn new(outcomes: Vec<Result<PollOutcome, AdapterError>>) -> Self {
            let mut script = outcomes;
            script.reverse();
            Self {
                kind: JobKind::VideoGenerate,
                script: Mutex::new(script),
                polls: AtomicUsize::new(0),
                cancels: AtomicUsize::new(0),
                start_error: None,
            }
        }

        /// Adapter whose start always fails.
        pub fn failing_start(msg: impl Into<String>) -> Self {
            Self {
                kind: JobKind::VideoGenerate,
                script: Mutex::new(Vec::new()),
                polls: AtomicUsize::new(0),
                cancels: AtomicUsize::new(0),
                start_error: Some(msg.into()),
            }
        }

        /// Adapter that never finishes.
        pub fn never_done() -> Self {
            Self {
                kind: JobKind::VideoGenerate,
                script: Mutex::new(Vec::new()),
                polls: AtomicUsize::new(0),
                cancels: AtomicUsize::new(0),
                start_error: None,
            }
        }
    }

    #[async_trait]
    impl Operation for ScriptedOperation {
        fn kind(&self) -> JobKind {
            self.kind
        }

        async fn start(&self) -> Result<OperationHandle, AdapterError> {
            match &self.start_error {
                Some(msg) => Err(AdapterError::start(msg.clone())),
                None => Ok(OperationHandle::new("scripted-op")),
            }
        }

        async fn poll(&self, _handle: &OperationHandle) -> Result<PollOutcome, AdapterError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop();
            match next {
                Some(outcome) => outcome,
                // Script exhausted: report "still running"
                None => Ok(PollOutcome::pending(None)),
            }
        }

        async fn cancel(&self, _handle: &OperationHandle) -> Result<(), AdapterError> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
