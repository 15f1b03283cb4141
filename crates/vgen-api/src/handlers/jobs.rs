//! Job submission and status handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use vgen_jobs::Operation;
use vgen_models::{Job, JobId, JobKind};
use vgen_ops::{DownloadOperation, GenerationOperation, GenerationRequest};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Request body for POST /api/jobs.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJobRequest {
    /// What kind of work to run
    pub kind: JobKind,

    /// Generation prompt (required for `video_generate`)
    #[validate(length(min = 1, max = 2000, message = "prompt must be 1-2000 characters"))]
    pub prompt: Option<String>,

    /// Source URL (required for `media_download`)
    #[validate(url(message = "url must be a valid URL"))]
    pub url: Option<String>,

    /// Aspect ratio hint for generation, e.g. "16:9"
    pub aspect_ratio: Option<String>,

    /// Requested clip length for generation
    #[validate(range(min = 1, max = 60, message = "duration must be 1-60 seconds"))]
    pub duration_seconds: Option<u32>,
}

impl CreateJobRequest {
    fn into_operation(self, state: &AppState) -> ApiResult<Arc<dyn Operation>> {
        match self.kind {
            JobKind::VideoGenerate => {
                let config = state
                    .generation
                    .as_ref()
                    .ok_or_else(|| {
                        ApiError::NotConfigured("generation provider".to_string())
                    })?;
                let prompt = self
                    .prompt
                    .ok_or_else(|| ApiError::bad_request("prompt is required for video_generate"))?;
                let op = GenerationOperation::new(
                    (**config).clone(),
                    GenerationRequest {
                        prompt,
                        aspect_ratio: self.aspect_ratio,
                        duration_seconds: self.duration_seconds,
                    },
                )
                .map_err(|e| ApiError::internal(e.to_string()))?;
                Ok(Arc::new(op))
            }
            JobKind::MediaDownload => {
                let url = self
                    .url
                    .ok_or_else(|| ApiError::bad_request("url is required for media_download"))?;
                Ok(Arc::new(DownloadOperation::new(
                    (*state.download).clone(),
                    url,
                )))
            }
        }
    }
}

/// POST /api/jobs
///
/// Accept a new job and return its pending snapshot immediately with 202.
/// The external operation runs in the background; clients follow it via
/// GET polling or the WebSocket stream.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    request.validate()?;

    let kind = request.kind;
    let op = request.into_operation(&state)?;
    let job = state.tracker.submit(op).await?;

    metrics::record_job_submitted(kind.as_str());
    info!(job_id = %job.id, kind = %kind, "Job submitted");

    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /api/jobs/:job_id
///
/// Current snapshot of a job. Used as the polling fallback when the
/// WebSocket stream is unavailable.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job = state.tracker.get(&JobId::from_string(job_id)).await?;
    Ok(Json(job))
}

/// POST /api/jobs/:job_id/cancel
///
/// Best-effort cancellation. Always returns a terminal snapshot; a job
/// that already finished keeps its original outcome.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job = state.tracker.cancel(&JobId::from_string(job_id)).await?;
    Ok(Json(job))
}

/// DELETE /api/jobs/:job_id
///
/// Remove a job record. Idempotent: deleting an unknown job still
/// answers 204.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> StatusCode {
    state.tracker.delete(&JobId::from_string(job_id)).await;
    StatusCode::NO_CONTENT
}
