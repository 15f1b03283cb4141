//! WebSocket event schemas.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Event types pushed to streaming clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobEventType {
    /// Log line
    Log,
    /// Progress update
    Progress,
    /// Job reached completed
    Done,
    /// Job reached failed or timed_out
    Error,
}

impl JobEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobEventType::Log => "log",
            JobEventType::Progress => "progress",
            JobEventType::Done => "done",
            JobEventType::Error => "error",
        }
    }
}

/// Event envelope pushed once per distinct job-state change.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Log message with timestamp
    Log {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Progress update (0-100)
    Progress { value: u8 },

    /// Job completed
    Done {
        #[serde(rename = "jobId")]
        job_id: String,
        result: String,
    },

    /// Job failed or timed out
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Create a log event.
    pub fn log(message: impl Into<String>) -> Self {
        JobEvent::Log {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a progress event.
    pub fn progress(value: u8) -> Self {
        JobEvent::Progress {
            value: value.min(100),
        }
    }

    /// Create a done event.
    pub fn done(job_id: impl Into<String>, result: impl Into<String>) -> Self {
        JobEvent::Done {
            job_id: job_id.into(),
            result: result.into(),
        }
    }

    /// Create an error event.
    pub fn error(message: impl Into<String>) -> Self {
        JobEvent::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Whether this event closes the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Done { .. } | JobEvent::Error { .. })
    }

    /// Get the event type.
    pub fn event_type(&self) -> JobEventType {
        match self {
            JobEvent::Log { .. } => JobEventType::Log,
            JobEvent::Progress { .. } => JobEventType::Progress,
            JobEvent::Done { .. } => JobEventType::Done,
            JobEvent::Error { .. } => JobEventType::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = JobEvent::log("Submitting generation request");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"log\""));
        assert!(json.contains("\"message\":\"Submitting generation request\""));
    }

    #[test]
    fn test_progress_clamped() {
        let event = JobEvent::progress(130);
        if let JobEvent::Progress { value } = event {
            assert_eq!(value, 100);
        } else {
            panic!("Expected Progress event");
        }
    }

    #[test]
    fn test_done_event_shape() {
        let event = JobEvent::done("job-1", "https://cdn/x.mp4");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"jobId\":\"job-1\""));
        assert!(json.contains("\"result\":\"https://cdn/x.mp4\""));
        assert!(event.is_terminal());
    }

    #[test]
    fn test_non_terminal_events() {
        assert!(!JobEvent::log("x").is_terminal());
        assert!(!JobEvent::progress(10).is_terminal());
        assert!(JobEvent::error("boom").is_terminal());
    }
}
