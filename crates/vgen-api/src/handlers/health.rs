//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub downloader: CheckStatus,
    pub generation: CheckStatus,
    pub tracker: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
        }
    }
}

/// Readiness check endpoint (readiness probe).
///
/// Verifies the downloader binary is resolvable and the generation
/// provider is configured. The tracker itself has no external
/// dependency; its check reports current load.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let downloader_check = match which::which(&state.download.binary) {
        Ok(_) => CheckStatus::ok(),
        Err(e) => CheckStatus::error(format!("{}: {}", state.download.binary, e)),
    };

    let generation_check = if state.generation.is_some() {
        CheckStatus::ok()
    } else {
        CheckStatus::error("generation provider not configured")
    };

    let active = state.tracker.active_jobs().await;
    let max = state.tracker.config().max_active;
    let tracker_check = if active < max {
        CheckStatus::ok()
    } else {
        CheckStatus::error(format!("at capacity ({}/{})", active, max))
    };

    // The downloader binary is the only hard requirement; an unconfigured
    // generation provider degrades but still serves download jobs
    let all_ok = downloader_check.status == "ok" && tracker_check.status == "ok";

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks {
            downloader: downloader_check,
            generation: generation_check,
            tracker: tracker_check,
        },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
