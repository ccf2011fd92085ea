//! ConversationLog: the session's append-only record of turns.
//!
//! Responsibilities:
//! - Keep provider-native turns exactly as exchanged with the model
//! - Build the model-facing history (`Vec<Content>`), skipping notices
//! - Derive the display transcript (`Vec<Message>`), including one
//!   "thinking" placeholder per function call

use crate::inference::types::Content;

use super::prompts::thinking_placeholder;
use super::types::{Message, MessageRole, Turn, TurnKind};

/// Ordered turns of one chat session.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn extend(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.turns.extend(turns);
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Turn::user(text));
    }

    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.push(Turn::notice(text));
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// History sent to the model: every turn except notices, in order.
    pub fn model_contents(&self) -> Vec<Content> {
        self.turns.iter().filter_map(Turn::to_content).collect()
    }

    /// Visible transcript.
    ///
    /// Function-result turns are not shown; a function-call turn shows any
    /// accompanying text followed by one placeholder per call.
    pub fn transcript(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.turns.len());
        for turn in &self.turns {
            match &turn.kind {
                TurnKind::User { text } => {
                    messages.push(message(turn, &turn.id, text.clone(), MessageRole::User));
                }
                TurnKind::ModelText { text } | TurnKind::Notice { text } => {
                    messages.push(message(turn, &turn.id, text.clone(), MessageRole::Assistant));
                }
                TurnKind::ModelFunctionCalls {
                    content,
                    indicators,
                } => {
                    let text: String = content
                        .parts
                        .iter()
                        .filter(|p| !p.is_thought())
                        .filter_map(|p| p.text.as_deref())
                        .collect();
                    if !text.trim().is_empty() {
                        messages.push(message(turn, &turn.id, text, MessageRole::Assistant));
                    }
                    for (i, indicator) in indicators.iter().enumerate() {
                        let mut placeholder = message(
                            turn,
                            &format!("{}-{i}", turn.id),
                            thinking_placeholder(&indicator.tool),
                            MessageRole::Assistant,
                        );
                        placeholder.api_call = Some(indicator.clone());
                        messages.push(placeholder);
                    }
                }
                TurnKind::FunctionResults { .. } => {}
            }
        }
        messages
    }
}

fn message(turn: &Turn, id: &str, content: String, role: MessageRole) -> Message {
    Message {
        id: id.to_string(),
        content,
        role,
        timestamp: turn.timestamp,
        api_call: None,
    }
}
