//! Adapter-internal error type.

use thiserror::Error;

/// Failures inside a concrete adapter, before they are flattened into the
/// start/poll/cancel error surface.
#[derive(Debug, Error)]
pub enum OpError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Decode(String),

    #[error("binary not found: {0}")]
    BinaryNotFound(#[from] which::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing configuration: {0}")]
    Config(&'static str),
}

pub type OpResult<T> = Result<T, OpError>;
