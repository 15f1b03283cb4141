//! Video generation through a remote HTTP provider.
//!
//! The provider exposes long-running operations: a submit call returns an
//! operation name, and the operation is then polled by GET until `done`.
//! Provider failure messages are carried through verbatim so the client
//! sees what the provider said, not a paraphrase.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vgen_jobs::{AdapterError, Operation, OperationHandle};
use vgen_models::{JobKind, PollOutcome};

use crate::error::{OpError, OpResult};

/// Submission timeout; polling uses its own shorter one.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_TIMEOUT: Duration = Duration::from_secs(15);

/// Provider connection settings.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Provider API base URL, no trailing slash
    pub base_url: String,
    /// API key sent on every request
    pub api_key: String,
    /// Model identifier for submissions
    pub model: String,
}

impl GenerationConfig {
    /// Read provider settings from the environment.
    pub fn from_env() -> OpResult<Self> {
        Ok(Self {
            base_url: std::env::var("GENERATION_API_URL")
                .map_err(|_| OpError::Config("GENERATION_API_URL"))?
                .trim_end_matches('/')
                .to_string(),
            api_key: std::env::var("GENERATION_API_KEY")
                .map_err(|_| OpError::Config("GENERATION_API_KEY"))?,
            model: std::env::var("GENERATION_MODEL")
                .unwrap_or_else(|_| "video-gen-1".to_string()),
        })
    }
}

/// What to generate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    /// Operation name, e.g. "operations/abc123"
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationStatus {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    metadata: Option<OperationMetadata>,
    #[serde(default)]
    response: Option<OperationResponse>,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationMetadata {
    #[serde(default)]
    progress_percent: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    video_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    message: String,
}

/// One video generation driven against the remote provider.
pub struct GenerationOperation {
    http: reqwest::Client,
    config: GenerationConfig,
    request: GenerationRequest,
}

impl GenerationOperation {
    pub fn new(config: GenerationConfig, request: GenerationRequest) -> OpResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(SUBMIT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            config,
            request,
        })
    }

    async fn submit(&self) -> OpResult<OperationHandle> {
        let url = format!(
            "{}/models/{}:generate",
            self.config.base_url, self.config.model
        );
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .json(&self.request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| OpError::Decode(e.to_string()))?;
        debug!(operation = %submitted.name, "Generation submitted");
        Ok(OperationHandle::new(submitted.name))
    }

    async fn fetch_status(&self, handle: &OperationHandle) -> OpResult<PollOutcome> {
        let url = format!("{}/{}", self.config.base_url, handle.as_str());
        let response = self
            .http
            .get(&url)
            .header("x-api-key", &self.config.api_key)
            .timeout(POLL_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let op: OperationStatus = response
            .json()
            .await
            .map_err(|e| OpError::Decode(e.to_string()))?;

        if !op.done {
            let progress = op.metadata.and_then(|m| m.progress_percent);
            return Ok(PollOutcome::pending(progress));
        }

        if let Some(error) = op.error {
            return Ok(PollOutcome::failed(error.message));
        }
        match op.response.and_then(|r| r.video_url) {
            Some(url) => Ok(PollOutcome::completed(url)),
            None => Ok(PollOutcome::failed(
                "generation finished without an output URL",
            )),
        }
    }
}

#[async_trait]
impl Operation for GenerationOperation {
    fn kind(&self) -> JobKind {
        JobKind::VideoGenerate
    }

    async fn start(&self) -> Result<OperationHandle, AdapterError> {
        self.submit()
            .await
            .map_err(|e| AdapterError::start(e.to_string()))
    }

    async fn poll(&self, handle: &OperationHandle) -> Result<PollOutcome, AdapterError> {
        self.fetch_status(handle)
            .await
            .map_err(|e| AdapterError::poll(e.to_string()))
    }

    async fn cancel(&self, handle: &OperationHandle) -> Result<(), AdapterError> {
        let url = format!("{}/{}:cancel", self.config.base_url, handle.as_str());
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .timeout(POLL_TIMEOUT)
            .send()
            .await
            .map_err(|e| AdapterError::cancel(e.to_string()))?;

        // Providers without a cancel primitive answer 404; the local job is
        // finalized regardless
        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            warn!(operation = %handle, status = %response.status(), "Upstream cancel rejected");
            Err(AdapterError::cancel(format!(
                "provider returned {}",
                response.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> GenerationConfig {
        GenerationConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            model: "video-gen-1".to_string(),
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "a cat surfing".to_string(),
            aspect_ratio: Some("16:9".to_string()),
            duration_seconds: Some(8),
        }
    }

    #[tokio::test]
    async fn start_submits_prompt_and_returns_operation_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/video-gen-1:generate"))
            .and(header("x-api-key", "test-key"))
            .and(body_partial_json(json!({ "prompt": "a cat surfing" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "name": "operations/op-1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let op = GenerationOperation::new(config(&server), request()).unwrap();
        let handle = op.start().await.unwrap();
        assert_eq!(handle.as_str(), "operations/op-1");
    }

    #[tokio::test]
    async fn start_surfaces_provider_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let op = GenerationOperation::new(config(&server), request()).unwrap();
        let err = op.start().await.unwrap_err();
        assert!(matches!(err, AdapterError::Start(_)));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn poll_maps_running_operation_to_pending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "done": false,
                "metadata": { "progressPercent": 40 }
            })))
            .mount(&server)
            .await;

        let op = GenerationOperation::new(config(&server), request()).unwrap();
        let outcome = op
            .poll(&OperationHandle::new("operations/op-1"))
            .await
            .unwrap();
        assert!(!outcome.done);
        assert_eq!(outcome.progress, Some(40));
    }

    #[tokio::test]
    async fn poll_maps_finished_operation_to_completed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "done": true,
                "response": { "videoUrl": "https://cdn.example/v.mp4" }
            })))
            .mount(&server)
            .await;

        let op = GenerationOperation::new(config(&server), request()).unwrap();
        let outcome = op
            .poll(&OperationHandle::new("operations/op-1"))
            .await
            .unwrap();
        assert!(outcome.done);
        assert_eq!(outcome.output.as_deref(), Some("https://cdn.example/v.mp4"));
    }

    #[tokio::test]
    async fn poll_preserves_provider_error_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "done": true,
                "error": { "message": "content policy violation" }
            })))
            .mount(&server)
            .await;

        let op = GenerationOperation::new(config(&server), request()).unwrap();
        let outcome = op
            .poll(&OperationHandle::new("operations/op-1"))
            .await
            .unwrap();
        assert!(outcome.done);
        assert_eq!(outcome.error.as_deref(), Some("content policy violation"));
        assert!(outcome.output.is_none());
    }

    #[tokio::test]
    async fn poll_transport_failure_is_adapter_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&server)
            .await;

        let op = GenerationOperation::new(config(&server), request()).unwrap();
        let err = op
            .poll(&OperationHandle::new("operations/op-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Poll(_)));
    }

    #[tokio::test]
    async fn cancel_tolerates_missing_cancel_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/operations/op-1:cancel"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let op = GenerationOperation::new(config(&server), request()).unwrap();
        op.cancel(&OperationHandle::new("operations/op-1"))
            .await
            .unwrap();
    }
}
