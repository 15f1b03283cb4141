//! Adapter poll outcome.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Result of one poll of an external operation.
///
/// "Not done yet" is a normal outcome, never an error. Adapter errors are
/// reserved for infrastructure trouble (network, rate limits) and are
/// retried by the poller on the next tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PollOutcome {
    /// Whether the external operation has reached a terminal state
    pub done: bool,

    /// Progress reported by the provider (0-100), if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,

    /// Output payload (e.g. a hosted URL) when done successfully
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Provider error message when done unsuccessfully, verbatim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PollOutcome {
    /// The operation is still running.
    pub fn pending(progress: Option<u8>) -> Self {
        Self {
            done: false,
            progress,
            ..Default::default()
        }
    }

    /// The operation finished with an output payload.
    pub fn completed(output: impl Into<String>) -> Self {
        Self {
            done: true,
            progress: Some(100),
            output: Some(output.into()),
            error: None,
        }
    }

    /// The operation itself reported a failure.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            done: true,
            progress: None,
            output: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_outcome() {
        let outcome = PollOutcome::pending(Some(30));
        assert!(!outcome.done);
        assert_eq!(outcome.progress, Some(30));
        assert!(outcome.output.is_none());
    }

    #[test]
    fn test_completed_outcome() {
        let outcome = PollOutcome::completed("https://cdn/out.mp4");
        assert!(outcome.done);
        assert_eq!(outcome.output.as_deref(), Some("https://cdn/out.mp4"));
        assert!(outcome.error.is_none());
    }
}
