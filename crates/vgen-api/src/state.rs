//! Application state.

use std::sync::Arc;

use vgen_jobs::{JobTracker, TrackerConfig};
use vgen_ops::{DownloadConfig, GenerationConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub tracker: Arc<JobTracker>,
    /// Generation provider settings; `None` when the provider is not
    /// configured, in which case generation submissions are refused
    pub generation: Option<Arc<GenerationConfig>>,
    pub download: Arc<DownloadConfig>,
}

impl AppState {
    /// Create application state from the environment.
    pub fn new(config: ApiConfig) -> Self {
        let generation = GenerationConfig::from_env().ok().map(Arc::new);
        if generation.is_none() {
            tracing::warn!("Generation provider not configured, generation jobs will be refused");
        }

        Self {
            config,
            tracker: Arc::new(JobTracker::new(TrackerConfig::from_env())),
            generation,
            download: Arc::new(DownloadConfig::from_env()),
        }
    }
}
