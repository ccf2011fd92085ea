//! Agent Core error types.

use thiserror::Error;

use crate::inference::InferenceError;

/// Errors that end an assistant run or reject a request to start one.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The generative endpoint failed.
    #[error("{0}")]
    Inference(#[from] InferenceError),

    /// A run is already in flight for this session.
    #[error("the assistant is still working on the previous message")]
    Busy,

    /// The tool manifest failed to load earlier in this session.
    #[error("tools unavailable: {reason}")]
    ToolsUnavailable { reason: String },
}
