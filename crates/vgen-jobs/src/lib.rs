//! Async job tracking for long-running external operations.
//!
//! This crate provides:
//! - An injectable in-memory job store with validated updates
//! - The `Operation` adapter contract over slow external calls
//! - A per-job poller with fixed interval and hard attempt cap
//! - An in-process progress hub for streaming state changes

pub mod adapter;
pub mod error;
pub mod notifier;
pub mod poller;
pub mod store;
pub mod tracker;

pub use adapter::{AdapterError, Operation, OperationHandle};
pub use error::{JobError, JobResult};
pub use notifier::ProgressHub;
pub use poller::PollerConfig;
pub use store::JobStore;
pub use tracker::{JobTracker, TrackerConfig};
