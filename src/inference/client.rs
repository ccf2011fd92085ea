//! Generative-language API client.
//!
//! Sends `generateContent` (batch) and `streamGenerateContent` (streaming)
//! requests. The orchestrator only sees the [`GenerativeModel`] trait, so tests
//! drive it with scripted replies instead of a live endpoint.

use std::future::Future;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client as HttpClient;

use crate::config::{GenerativeConfig, ModelVariant};

use super::errors::InferenceError;
use super::streaming::parse_ndjson_stream;
use super::types::{GenerateContentRequest, GenerateContentResponse};

// ─── Constants ──────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Stream of response fragments from `streamGenerateContent`.
pub type FragmentStream = BoxStream<'static, Result<GenerateContentResponse, InferenceError>>;

// ─── Trait ──────────────────────────────────────────────────────────────────

/// A generative model reachable in batch or streaming mode.
pub trait GenerativeModel: Send + Sync {
    /// One request, one complete response.
    fn generate_content(
        &self,
        model: &ModelVariant,
        request: &GenerateContentRequest,
    ) -> impl Future<Output = Result<GenerateContentResponse, InferenceError>> + Send;

    /// One request, a stream of partial responses.
    fn stream_generate_content(
        &self,
        model: &ModelVariant,
        request: &GenerateContentRequest,
    ) -> impl Future<Output = Result<FragmentStream, InferenceError>> + Send;
}

// ─── GenerativeClient ───────────────────────────────────────────────────────

/// HTTP client for the generative-language endpoint.
#[derive(Clone)]
pub struct GenerativeClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl GenerativeClient {
    /// Build a client from the `generative` config section.
    ///
    /// Does NOT check connectivity; that happens on the first request.
    pub fn from_config(config: &GenerativeConfig) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConfigError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_secs: config.request_timeout_secs,
        })
    }

    fn method_url(&self, model: &ModelVariant, method: &str) -> String {
        format!("{}/models/{}:{method}", self.base_url, model.wire_name())
    }

    async fn post(
        &self,
        url: &str,
        request: &GenerateContentRequest,
    ) -> Result<reqwest::Response, InferenceError> {
        tracing::info!(
            url = %url,
            content_count = request.contents.len(),
            tools = ?request.declared_function_names(),
            "=== LLM REQUEST ==="
        );

        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| InferenceError::from_send(url, self.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(url = %url, status = status.as_u16(), "generative endpoint error");
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

impl GenerativeModel for GenerativeClient {
    async fn generate_content(
        &self,
        model: &ModelVariant,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, InferenceError> {
        let url = self.method_url(model, "generateContent");
        let response = self.post(&url, request).await?;

        let body = response
            .text()
            .await
            .map_err(|e| InferenceError::InvalidResponse {
                reason: format!("failed to read response body: {e}"),
            })?;

        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| InferenceError::InvalidResponse {
                reason: format!("{e} (body: {body})"),
            })?;

        if let Some(usage) = parsed.usage_metadata {
            tracing::debug!(
                prompt_tokens = ?usage.prompt_token_count,
                completion_tokens = ?usage.candidates_token_count,
                "LLM response complete"
            );
        }

        Ok(parsed)
    }

    async fn stream_generate_content(
        &self,
        model: &ModelVariant,
        request: &GenerateContentRequest,
    ) -> Result<FragmentStream, InferenceError> {
        let url = self.method_url(model, "streamGenerateContent");
        let response = self.post(&url, request).await?;
        Ok(parse_ndjson_stream(response).boxed())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
