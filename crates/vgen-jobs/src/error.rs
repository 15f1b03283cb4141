//! Tracker error types.

use thiserror::Error;

use vgen_models::TransitionError;

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("Too many active jobs ({active}/{max})")]
    Busy { active: usize, max: usize },
}

impl JobError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }
}
