//! Shared types for the agent core.
//!
//! The conversation log's turns, the display messages derived from them, and
//! the events and outcomes of one orchestrator run.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::inference::types::Content;

// ─── Mode ───────────────────────────────────────────────────────────────────

/// What the user allows the assistant to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiMode {
    /// Read-only: only GET-bound and front tools are offered.
    #[default]
    Question,
    /// Every tool is offered.
    Action,
}

impl fmt::Display for AiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiMode::Question => f.write_str("question"),
            AiMode::Action => f.write_str("action"),
        }
    }
}

impl FromStr for AiMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "question" | "q" => Ok(AiMode::Question),
            "action" | "a" => Ok(AiMode::Action),
            other => Err(format!("unknown mode '{other}' (expected question or action)")),
        }
    }
}

// ─── Display Transcript ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Descriptor rendered as an in-progress "tool call" indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallIndicator {
    /// HTTP verb, or `FRONT` for local tools.
    pub method: String,
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub params: serde_json::Value,
}

/// One entry of the visible transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub role: MessageRole,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_call: Option<ApiCallIndicator>,
}

// ─── Conversation Log ───────────────────────────────────────────────────────

/// Kind of a logged turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnKind {
    User { text: String },
    ModelText { text: String },
    /// The model's function-call turn, exactly as received.
    ModelFunctionCalls {
        content: Content,
        indicators: Vec<ApiCallIndicator>,
    },
    /// All outcomes of one batch of calls.
    FunctionResults { content: Content },
    /// Status, error or fallback text shown to the user but never sent to
    /// the model.
    Notice { text: String },
}

/// An entry of the append-only conversation log.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: TurnKind,
}

impl Turn {
    pub fn new(kind: TurnKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(TurnKind::User { text: text.into() })
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self::new(TurnKind::ModelText { text: text.into() })
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(TurnKind::Notice { text: text.into() })
    }

    /// The model-facing form of this turn; `None` for notices.
    pub fn to_content(&self) -> Option<Content> {
        match &self.kind {
            TurnKind::User { text } => Some(Content::user_text(text.clone())),
            TurnKind::ModelText { text } => Some(Content::model_text(text.clone())),
            TurnKind::ModelFunctionCalls { content, .. } => Some(content.clone()),
            TurnKind::FunctionResults { content } => Some(content.clone()),
            TurnKind::Notice { .. } => None,
        }
    }
}

// ─── Run Events & Outcomes ──────────────────────────────────────────────────

/// Progress reported while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A batch of calls is about to execute; one placeholder per call.
    ToolCallsStarted(Vec<ApiCallIndicator>),
    /// A call finished.
    ToolCallFinished { tool: String, ok: bool },
    /// Running concatenation of streamed answer text.
    StreamText(String),
    /// Streamed text so far must be discarded.
    StreamReset,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model produced a final text answer.
    Answered(String),
    /// The model returned neither text nor calls.
    Fallback,
    /// The iteration budget ran out before a text answer.
    IterationsExhausted,
    /// The model called `stopAgent`.
    Stopped,
    /// The user cancelled; not an error.
    Cancelled,
}

/// Result of one orchestrator run: the turns to append and how it ended.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub turns: Vec<Turn>,
    /// Completed function-call rounds.
    pub rounds: u32,
}
