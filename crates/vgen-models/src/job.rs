//! Job definitions for external operation tracking.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a tracked job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of external operation the job wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Generate a video through a remote generation model
    VideoGenerate,
    /// Download external media via a CLI tool
    MediaDownload,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::VideoGenerate => "video_generate",
            JobKind::MediaDownload => "media_download",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job accepted, external operation not yet confirmed started
    #[default]
    Pending,
    /// External operation submitted, being polled
    Processing,
    /// Operation finished successfully
    Completed,
    /// Operation failed or was cancelled
    Failed,
    /// Attempt budget exhausted before the operation finished
    TimedOut,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::TimedOut
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a patch would violate the job state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job is already terminal ({0})")]
    AlreadyTerminal(JobState),

    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: JobState, to: JobState },

    #[error("progress cannot decrease ({from} -> {to})")]
    ProgressDecrease { from: u8, to: u8 },

    #[error("terminal patch must carry exactly one of result/error")]
    BadTerminalPayload,

    #[error("result/error are only valid on a terminal patch")]
    PayloadBeforeTerminal,
}

/// A tracked asynchronous job wrapping one external operation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Operation kind
    pub kind: JobKind,

    /// Lifecycle state
    #[serde(default)]
    pub state: JobState,

    /// Progress (0-100), monotonically non-decreasing
    #[serde(default)]
    pub progress: u8,

    /// Result payload (e.g. a hosted URL), set only on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Failure reason, set only on failure or timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Number of polls performed so far
    #[serde(default)]
    pub attempts: u32,
}

impl Job {
    /// Create a new pending job.
    pub fn new(kind: JobKind) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            state: JobState::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            attempts: 0,
        }
    }

    /// Apply a validated partial update, enforcing the state machine.
    ///
    /// All mutation of a job flows through here: monotonic progress,
    /// legal transitions only, and exactly one of result/error at a
    /// terminal state.
    pub fn apply(mut self, patch: JobPatch) -> Result<Self, TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(self.state));
        }

        if let Some(to) = patch.state {
            let legal = match (self.state, to) {
                (JobState::Pending, JobState::Processing) => true,
                // Covers cancel-before-start and submission failures
                (JobState::Pending, JobState::Failed) => true,
                (JobState::Processing, s) if s.is_terminal() => true,
                (from, to) if from == to => true,
                _ => false,
            };
            if !legal {
                return Err(TransitionError::IllegalTransition {
                    from: self.state,
                    to,
                });
            }
        }

        let target = patch.state.unwrap_or(self.state);
        if target.is_terminal() {
            let has_result = patch.result.is_some();
            let has_error = patch.error.is_some();
            let want_result = target == JobState::Completed;
            if has_result != want_result || has_error == want_result {
                return Err(TransitionError::BadTerminalPayload);
            }
        } else if patch.result.is_some() || patch.error.is_some() {
            return Err(TransitionError::PayloadBeforeTerminal);
        }

        if let Some(p) = patch.progress {
            let p = p.min(100);
            if p < self.progress {
                return Err(TransitionError::ProgressDecrease {
                    from: self.progress,
                    to: p,
                });
            }
            self.progress = p;
        }

        if let Some(state) = patch.state {
            self.state = state;
        }
        if self.state == JobState::Completed {
            self.progress = 100;
        }
        self.result = patch.result.or(self.result);
        self.error = patch.error.or(self.error);
        if patch.record_attempt {
            self.attempts += 1;
        }
        self.updated_at = Utc::now();

        Ok(self)
    }
}

/// Validated partial update applied through [`Job::apply`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobPatch {
    /// Target state, if transitioning
    pub state: Option<JobState>,
    /// New progress value (0-100)
    pub progress: Option<u8>,
    /// Result payload (terminal success only)
    pub result: Option<String>,
    /// Failure reason (terminal failure only)
    pub error: Option<String>,
    /// Count this update as a poll attempt
    #[serde(default)]
    pub record_attempt: bool,
}

impl JobPatch {
    /// Transition to processing.
    pub fn processing() -> Self {
        Self {
            state: Some(JobState::Processing),
            ..Default::default()
        }
    }

    /// Record a poll that reported progress but no completion.
    pub fn progress(value: Option<u8>) -> Self {
        Self {
            progress: value,
            record_attempt: true,
            ..Default::default()
        }
    }

    /// Terminal success with a result payload.
    pub fn completed(result: impl Into<String>) -> Self {
        Self {
            state: Some(JobState::Completed),
            result: Some(result.into()),
            record_attempt: true,
            ..Default::default()
        }
    }

    /// Terminal failure with a reason.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: Some(JobState::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Attempt budget exhausted.
    pub fn timed_out(error: impl Into<String>) -> Self {
        Self {
            state: Some(JobState::TimedOut),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
