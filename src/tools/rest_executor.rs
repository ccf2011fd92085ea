//! Generic REST executor for backend-bound tools.
//!
//! Builds the URL from the configured base and the tool's endpoint template,
//! attaches the bearer token, and sends parameters as a query string (GET,
//! DELETE) or a JSON body (POST, PUT, PATCH). Non-2xx answers become
//! [`ToolError::RequestFailed`], the only error signal surfaced to the agent.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{Map, Value};

use crate::config::BackendConfig;
use crate::events::{AppEvent, EventBus};

use super::errors::ToolError;
use super::types::HttpMethod;

// ─── Constants ──────────────────────────────────────────────────────────────

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Request / Response ─────────────────────────────────────────────────────

/// A fully resolved backend call: path parameters already substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct RestCall {
    pub method: HttpMethod,
    pub endpoint: String,
    pub params: Map<String, Value>,
}

/// A successful backend answer.
#[derive(Debug, Clone, PartialEq)]
pub enum RestResponse {
    /// HTTP 204.
    NoContent,
    Json(Value),
    Text(String),
}

impl RestResponse {
    /// Value fed back to the model, with oversized payloads cut to
    /// `max_chars` bytes.
    pub fn into_model_value(self, max_chars: usize) -> Value {
        match self {
            RestResponse::NoContent => Value::Null,
            RestResponse::Text(text) => Value::String(truncate_result(&text, max_chars)),
            RestResponse::Json(value) => {
                let serialized = value.to_string();
                if serialized.len() <= max_chars {
                    value
                } else {
                    Value::String(truncate_result(&serialized, max_chars))
                }
            }
        }
    }
}

fn truncate_result(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    tracing::warn!(
        original_len = text.len(),
        truncated_to = end,
        "tool result truncated"
    );
    format!(
        "{}\n\n[... truncated: showing first {end} of {} bytes]",
        &text[..end],
        text.len()
    )
}

// ─── Path Parameters ────────────────────────────────────────────────────────

/// Replace `{param}` tokens in `template` with argument values.
///
/// Consumed arguments are removed from the returned parameter set; values are
/// percent-encoded. A token without a matching argument is an error.
pub fn substitute_path_params(
    tool: &str,
    template: &str,
    args: &Value,
) -> Result<(String, Map<String, Value>), ToolError> {
    let mut params = args.as_object().cloned().unwrap_or_default();
    let mut endpoint = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close_rel) = rest[open..].find('}') else {
            break;
        };
        let close = open + close_rel;
        let name = &rest[open + 1..close];

        endpoint.push_str(&rest[..open]);
        let value = params
            .remove(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| ToolError::MissingPathParam {
                tool: tool.to_string(),
                param: name.to_string(),
            })?;
        endpoint.push_str(&urlencoding::encode(&scalar_to_string(&value)));
        rest = &rest[close + 1..];
    }
    endpoint.push_str(rest);

    Ok((endpoint, params))
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flatten parameters into query pairs.
///
/// Arrays repeat the key; nulls are dropped; objects are sent as JSON text.
pub fn query_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items.iter().filter(|v| !v.is_null()) {
                    pairs.push((key.clone(), scalar_to_string(item)));
                }
            }
            other => pairs.push((key.clone(), scalar_to_string(other))),
        }
    }
    pairs
}

/// Join the configured base URL and an endpoint path.
pub fn build_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if endpoint.starts_with('/') {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/{endpoint}")
    }
}

/// Refresh signal other views listen for after a successful mutation.
pub fn refresh_event(method: HttpMethod, endpoint: &str) -> Option<AppEvent> {
    if method.is_read_only() {
        return None;
    }
    if endpoint.starts_with("/api/BookInstance") {
        Some(AppEvent::BookInstancesUpdated {
            endpoint: endpoint.to_string(),
        })
    } else if endpoint.starts_with("/api/Reservation") {
        Some(AppEvent::InstanceStatusUpdate {
            endpoint: endpoint.to_string(),
        })
    } else {
        None
    }
}

// ─── Bearer Token ───────────────────────────────────────────────────────────

/// Source of the backend bearer token, read fresh on every call so a new
/// login is picked up without restarting.
#[derive(Debug, Clone)]
pub struct TokenSource {
    env_var: String,
    file: Option<PathBuf>,
}

impl TokenSource {
    pub fn new(env_var: impl Into<String>, file: Option<PathBuf>) -> Self {
        Self {
            env_var: env_var.into(),
            file,
        }
    }

    pub async fn token(&self) -> Option<String> {
        if let Ok(token) = std::env::var(&self.env_var) {
            if !token.trim().is_empty() {
                return Some(token.trim().to_string());
            }
        }
        let path = self.file.as_ref()?;
        match tokio::fs::read_to_string(path).await {
            Ok(raw) if !raw.trim().is_empty() => Some(raw.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no bearer token file");
                None
            }
        }
    }
}

// ─── Trait ──────────────────────────────────────────────────────────────────

/// Executes resolved backend calls.
pub trait RestBackend: Send + Sync {
    fn execute(&self, call: &RestCall) -> impl Future<Output = Result<RestResponse, ToolError>> + Send;
}

// ─── RestExecutor ───────────────────────────────────────────────────────────

/// HTTP implementation of [`RestBackend`] against the library API.
#[derive(Clone)]
pub struct RestExecutor {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenSource,
    events: EventBus,
}

impl RestExecutor {
    pub fn from_config(config: &BackendConfig, events: EventBus) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ToolError::Transport {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let token_file = config
            .token_file
            .as_ref()
            .map(|p| PathBuf::from(crate::config::expand_home(&p.to_string_lossy())));

        Ok(Self::new(
            http,
            config.base_url.clone(),
            TokenSource::new(config.token_env.clone(), token_file),
            events,
        ))
    }

    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        tokens: TokenSource,
        events: EventBus,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            tokens,
            events,
        }
    }
}

impl RestBackend for RestExecutor {
    async fn execute(&self, call: &RestCall) -> Result<RestResponse, ToolError> {
        let url = build_url(&self.base_url, &call.endpoint);
        let transport = |e: reqwest::Error| ToolError::Transport {
            endpoint: call.endpoint.clone(),
            reason: e.to_string(),
        };

        let mut request = self
            .http
            .request(call.method.into(), &url)
            .header(ACCEPT, "application/json");
        if let Some(token) = self.tokens.token().await {
            request = request.bearer_auth(token);
        }
        request = if call.method.sends_body() {
            request.json(&Value::Object(call.params.clone()))
        } else {
            request.query(&query_pairs(&call.params))
        };

        tracing::info!(method = %call.method, endpoint = %call.endpoint, "API call");
        let response = request.send().await.map_err(transport)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                method = %call.method,
                endpoint = %call.endpoint,
                status = status.as_u16(),
                "API call failed"
            );
            return Err(ToolError::RequestFailed {
                endpoint: call.endpoint.clone(),
                status: status.as_u16(),
                body,
            });
        }

        if let Some(event) = refresh_event(call.method, &call.endpoint) {
            self.events.publish(event);
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(RestResponse::NoContent);
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json") || ct.contains("+json"));

        let body = response.text().await.map_err(transport)?;
        if is_json {
            match serde_json::from_str(&body) {
                Ok(value) => Ok(RestResponse::Json(value)),
                Err(e) => {
                    tracing::warn!(endpoint = %call.endpoint, error = %e, "JSON content-type with unparsable body");
                    Ok(RestResponse::Text(body))
                }
            }
        } else {
            Ok(RestResponse::Text(body))
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
