//! Chat commands of the terminal front end.
//!
//! Parses slash commands typed at the prompt and renders run progress and
//! transcripts as terminal text. The binary wires these to a `ChatSession`.

use crate::agent_core::prompts::{FALLBACK_TEXT, MAX_ITERATIONS_TEXT};
use crate::agent_core::types::{AiMode, Message, MessageRole, RunEvent, RunOutcome};
use crate::config::AssistantConfig;

// ─── Commands ───────────────────────────────────────────────────────────────

/// A slash command typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// `/mode` without an argument shows the current mode.
    Mode(Option<AiMode>),
    Model(String),
    Models,
    Reset,
    History,
    Help,
    Quit,
}

/// What a line of input is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Command(ChatCommand),
    /// A malformed command; the text explains why.
    Invalid(String),
    Message(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Input::Message(line.to_string());
        };

        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default().to_ascii_lowercase();
        let arg = words.next();

        let command = match (name.as_str(), arg) {
            ("mode", None) => ChatCommand::Mode(None),
            ("mode", Some(value)) => match value.parse() {
                Ok(mode) => ChatCommand::Mode(Some(mode)),
                Err(e) => return Input::Invalid(e),
            },
            ("model", Some(key)) => ChatCommand::Model(key.to_string()),
            ("model", None) => return Input::Invalid("usage: /model <key>".to_string()),
            ("models", _) => ChatCommand::Models,
            ("reset" | "clear", _) => ChatCommand::Reset,
            ("history", _) => ChatCommand::History,
            ("help" | "?", _) => ChatCommand::Help,
            ("quit" | "exit" | "q", _) => ChatCommand::Quit,
            (other, _) => return Input::Invalid(format!("unknown command '/{other}', try /help")),
        };
        Input::Command(command)
    }
}

pub const HELP_TEXT: &str = "\
Commands:
  /mode [question|action]  show or switch the assistant mode
  /model <key>             switch the model variant
  /models                  list configured model variants
  /reset                   clear the conversation and reload tools
  /history                 print the conversation
  /help                    show this help
  /quit                    exit
Ctrl-C cancels the request in progress.";

/// Configured variants, one per line, the active one marked.
pub fn format_models(config: &AssistantConfig, active: &str) -> String {
    config
        .model_keys()
        .into_iter()
        .filter_map(|key| config.model(key).ok())
        .map(|variant| {
            let marker = if variant.key == active { "*" } else { " " };
            let mut caps = Vec::new();
            if variant.streaming {
                caps.push("streaming");
            }
            if variant.supports_tool_calls {
                caps.push("tools");
            }
            format!(
                "{marker} {key:<20} {name} [{caps}]",
                key = variant.key,
                name = variant.display_name,
                caps = caps.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The visible transcript as terminal text.
pub fn format_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let who = match m.role {
                MessageRole::User => "Вы",
                MessageRole::Assistant => "Ассистент",
            };
            let time = m.timestamp.format("%H:%M:%S");
            match &m.api_call {
                Some(call) => format!("[{time}] {who}: {} ({} {})", m.content, call.method, call.tool),
                None => format!("[{time}] {who}: {}", m.content),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Run Rendering ──────────────────────────────────────────────────────────

/// Turns run events into terminal output, printing streamed text
/// incrementally.
#[derive(Debug, Default)]
pub struct RunRenderer {
    streamed: usize,
}

impl RunRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to print for an event, if any.
    pub fn on_event(&mut self, event: RunEvent) -> Option<String> {
        match event {
            RunEvent::ToolCallsStarted(indicators) => {
                // Text streamed before the calls is complete; the next round
                // streams a fresh reply from offset zero.
                let mut out = if std::mem::take(&mut self.streamed) > 0 {
                    "\n".to_string()
                } else {
                    String::new()
                };
                for i in &indicators {
                    match &i.endpoint {
                        Some(endpoint) => {
                            out.push_str(&format!("  ⋯ {} {} ({})\n", i.method, endpoint, i.tool))
                        }
                        None => out.push_str(&format!("  ⋯ {}\n", i.tool)),
                    }
                }
                Some(out)
            }
            RunEvent::ToolCallFinished { tool, ok: false } => Some(format!("  ✗ {tool}\n")),
            RunEvent::ToolCallFinished { .. } => None,
            RunEvent::StreamText(running) => {
                let delta = running.get(self.streamed..).unwrap_or_default().to_string();
                self.streamed = running.len();
                (!delta.is_empty()).then_some(delta)
            }
            RunEvent::StreamReset => {
                let had_text = self.streamed > 0;
                self.streamed = 0;
                had_text.then(|| "\n".to_string())
            }
        }
    }

    /// Closing text once the run has ended.
    pub fn finish(&mut self, outcome: &RunOutcome) -> String {
        let streamed = std::mem::take(&mut self.streamed) > 0;
        match outcome {
            RunOutcome::Answered(_) if streamed => "\n".to_string(),
            RunOutcome::Answered(text) => format!("{text}\n"),
            RunOutcome::Fallback => format!("{FALLBACK_TEXT}\n"),
            RunOutcome::IterationsExhausted => format!("{MAX_ITERATIONS_TEXT}\n"),
            RunOutcome::Stopped => "Агент остановлен\n".to_string(),
            RunOutcome::Cancelled => "(запрос отменён)\n".to_string(),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
