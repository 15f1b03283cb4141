//! Shared data models for the vgen backend.
//!
//! This crate provides Serde-serializable types for:
//! - Tracked jobs and their lifecycle states
//! - Validated partial job updates
//! - Adapter poll outcomes
//! - WebSocket event schemas

pub mod event;
pub mod job;
pub mod poll;

// Re-export common types
pub use event::{JobEvent, JobEventType};
pub use job::{Job, JobId, JobKind, JobPatch, JobState, TransitionError};
pub use poll::PollOutcome;
