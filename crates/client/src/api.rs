//! REST client for the generation server's HTTP endpoints.
//!
//! Wraps job submission, single-shot status retrieval and the model
//! list using [`reqwest`]. No retries happen here; the polling
//! fallback decides when to ask again.

use async_trait::async_trait;
use serde::Deserialize;

use audiogen_core::generation::{GenerateRequest, GenerateResponse, ModelInfo};
use audiogen_core::status::StatusSnapshot;

use crate::config::TrackerConfig;

/// Single-shot status lookup for one job.
///
/// Implemented by [`StatusApi`]; the polling fallback only depends on
/// this trait.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusSnapshot, TransportError>;
}

/// HTTP client for one generation server.
#[derive(Debug, Clone)]
pub struct StatusApi {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// Errors from the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("Server API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The body was not the expected JSON shape.
    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The configured base URL could not be used.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

impl StatusApi {
    /// Create a client with a default [`reqwest::Client`].
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8000`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    /// Build a client whose requests time out after
    /// [`TrackerConfig::request_timeout`].
    pub fn from_config(config: &TrackerConfig) -> Result<Self, TransportError> {
        if !config.api_url.starts_with("http://") && !config.api_url.starts_with("https://") {
            return Err(TransportError::InvalidUrl(config.api_url.clone()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config.api_url.clone()))
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// `GET /api/jobs/{job_id}`: the current snapshot of one job.
    pub async fn fetch_status(&self, job_id: &str) -> Result<StatusSnapshot, TransportError> {
        let response = self
            .client
            .get(format!("{}/api/jobs/{}", self.api_url, job_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `POST /api/generate`: queue a new generation.
    pub async fn submit_generation(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, TransportError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.api_url))
            .json(request)
            .send()
            .await?;

        let submitted: GenerateResponse = Self::parse_response(response).await?;
        tracing::info!(
            job_id = %submitted.job_id,
            estimated_seconds = submitted.estimated_seconds,
            rate_limit_remaining = submitted.rate_limit_remaining,
            "Generation submitted",
        );
        Ok(submitted)
    }

    /// `GET /api/models`: models the server can run.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, TransportError> {
        let response = self
            .client
            .get(format!("{}/api/models", self.api_url))
            .send()
            .await?;

        let body: ModelsResponse = Self::parse_response(response).await?;
        Ok(body.models)
    }

    /// Absolute download URL for a generated file.
    pub fn file_url(&self, filename: &str) -> String {
        format!("{}/api/files/{}", self.api_url, filename)
    }

    /// Absolute download URL for a snapshot's `result_url`, which the
    /// server reports as a path such as `/api/files/<name>.wav`.
    pub fn resolve_result_url(&self, result_url: &str) -> String {
        let filename = result_url.rsplit('/').next().unwrap_or(result_url);
        self.file_url(filename)
    }

    // ---- private helpers ----

    /// Return the response unchanged on a 2xx status, or an
    /// [`TransportError::ApiError`] carrying the status and body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Decode a successful JSON body, keeping decode failures distinct
    /// from transport failures.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl StatusFetcher for StatusApi {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusSnapshot, TransportError> {
        StatusApi::fetch_status(self, job_id).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use audiogen_core::status::JobStatus;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn fetch_status_decodes_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/jobs/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "job_id": "abc",
                "status": "running",
                "progress": 45,
                "message": "Generating audio",
                "result_url": null,
                "error": null,
                "params": {"prompt": "rain"},
                "created_at": "2024-05-01T12:00:00.000001",
                "started_at": "2024-05-01T12:00:01.5",
                "completed_at": null
            })))
            .mount(&server)
            .await;

        let api = StatusApi::new(server.uri());
        let snap = api.fetch_status("abc").await.expect("fetch should succeed");

        assert_eq!(snap.status, JobStatus::Running);
        assert_eq!(snap.progress, 45);
        assert!(snap.started_at.is_some());
        assert!(snap.completed_at.is_none());
    }

    #[tokio::test]
    async fn missing_job_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/jobs/nope"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({"detail": "Job not found"})),
            )
            .mount(&server)
            .await;

        let api = StatusApi::new(server.uri());
        let err = api.fetch_status("nope").await.unwrap_err();

        assert_matches!(err, TransportError::ApiError { status: 404, ref body } if body.contains("Job not found"));
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/jobs/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let api = StatusApi::new(server.uri());
        assert_matches!(api.fetch_status("abc").await, Err(TransportError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_request_error() {
        // Nothing listens on port 9 on the loopback interface.
        let api = StatusApi::new("http://127.0.0.1:9");
        assert_matches!(api.fetch_status("abc").await, Err(TransportError::Request(_)));
    }

    #[tokio::test]
    async fn submit_generation_posts_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({"prompt": "lofi", "model": "musicgen-small"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "job_id": "job-1",
                "status": "queued",
                "estimated_seconds": 20,
                "rate_limit_remaining": 19
            })))
            .mount(&server)
            .await;

        let api = StatusApi::new(server.uri());
        let response = api
            .submit_generation(&GenerateRequest::with_prompt("lofi"))
            .await
            .expect("submit should succeed");

        assert_eq!(response.job_id, "job-1");
        assert_eq!(response.rate_limit_remaining, 19);
    }

    #[tokio::test]
    async fn rate_limited_submit_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit exceeded"))
            .mount(&server)
            .await;

        let api = StatusApi::new(server.uri());
        let err = api
            .submit_generation(&GenerateRequest::with_prompt("lofi"))
            .await
            .unwrap_err();
        assert_matches!(err, TransportError::ApiError { status: 429, .. });
    }

    #[tokio::test]
    async fn list_models_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{
                    "id": "musicgen-small",
                    "name": "MusicGen Small",
                    "type": "music",
                    "description": "Fast",
                    "supports_stereo": true,
                    "sample_rate": 32000,
                    "requires_gpu": false
                }]
            })))
            .mount(&server)
            .await;

        let models = StatusApi::new(server.uri()).list_models().await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "musicgen-small");
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let api = StatusApi::new("http://host:8000/");
        assert_eq!(api.file_url("abc.wav"), "http://host:8000/api/files/abc.wav");
        assert_eq!(
            api.resolve_result_url("/api/files/abc.wav"),
            "http://host:8000/api/files/abc.wav"
        );
    }

    #[test]
    fn from_config_rejects_non_http_url() {
        let config = TrackerConfig::with_api_url("ftp://host");
        assert_matches!(StatusApi::from_config(&config), Err(TransportError::InvalidUrl(_)));
    }
}
