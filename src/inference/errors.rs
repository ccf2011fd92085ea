//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to
//! build meaningful log entries and the user-visible error notice.

use thiserror::Error;

/// Errors that can occur while talking to the generative-language endpoint.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// Streaming body could not be read or a fragment was not valid JSON.
    #[error("stream error: {reason}")]
    StreamError { reason: String },

    /// A complete response body did not match the expected shape.
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },

    /// HTTP client construction failed.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl InferenceError {
    /// Map a reqwest send error onto the closest variant.
    pub(crate) fn from_send(endpoint: &str, timeout_secs: u64, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            InferenceError::Timeout {
                duration_secs: timeout_secs,
            }
        } else {
            InferenceError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
        }
    }
}
