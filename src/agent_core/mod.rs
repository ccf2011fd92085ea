//! Agent Core: orchestration layer for the library assistant.
//!
//! Submodules:
//! - `orchestrator`: the tool-calling loop against the generative model
//! - `session`: one chat conversation (log, registry, mode, loading flag)
//! - `conversation`: append-only turn log and the derived transcript
//! - `prompts`: system instruction and fixed user-facing strings
//! - `types`: shared types across the agent core
//! - `errors`: agent-level error types

pub mod conversation;
pub mod errors;
pub mod orchestrator;
pub mod prompts;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use conversation::ConversationLog;
pub use errors::AgentError;
pub use orchestrator::{Orchestrator, RunRequest};
pub use session::{CancelHandle, ChatSession};
pub use types::{
    AiMode, ApiCallIndicator, Message, MessageRole, RunEvent, RunOutcome, RunReport, Turn,
    TurnKind,
};
