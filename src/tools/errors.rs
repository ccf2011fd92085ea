//! Tool layer error types.

use thiserror::Error;

/// Errors from loading the tool manifest or executing a tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The manifest could not be fetched or read.
    #[error("tool manifest unavailable at '{location}': {reason}")]
    ManifestUnavailable { location: String, reason: String },

    /// The manifest was read but is not a valid tool list.
    #[error("tool manifest at '{location}' is malformed: {reason}")]
    ManifestMalformed { location: String, reason: String },

    /// The manifest parsed to an empty list.
    #[error("tool manifest at '{location}' lists no tools")]
    ManifestEmpty { location: String },

    /// The backend answered with a non-2xx status.
    #[error("API request to {endpoint} failed with status {status}: {body}")]
    RequestFailed {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The backend could not be reached or the body could not be read.
    #[error("transport error for {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    /// The endpoint template references an argument the model did not supply.
    #[error("missing path parameter '{param}' for tool '{tool}'")]
    MissingPathParam { tool: String, param: String },

    /// The model called a tool that was not offered in the current mode.
    #[error("tool '{name}' is not available in {mode} mode")]
    NotAllowedInMode { name: String, mode: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_failed_message_names_endpoint_and_status() {
        let err = ToolError::RequestFailed {
            endpoint: "/api/Books/7".into(),
            status: 404,
            body: "not found".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/api/Books/7"));
        assert!(msg.contains("404"));
        assert!(msg.contains("not found"));
    }
}
