//! Operation adapters.
//!
//! Concrete implementations of the `Operation` contract from `vgen-jobs`:
//! - [`GenerationOperation`]: video generation through a remote HTTP API
//!   with long-running server-side operations
//! - [`DownloadOperation`]: media download through a yt-dlp style CLI tool

pub mod command;
pub mod error;
pub mod generate;

pub use command::{DownloadConfig, DownloadOperation};
pub use error::OpError;
pub use generate::{GenerationConfig, GenerationOperation, GenerationRequest};
