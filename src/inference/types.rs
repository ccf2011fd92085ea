//! Wire types for the generative-language API.
//!
//! These mirror the `generateContent` / `streamGenerateContent` JSON shapes,
//! used for both request building and response parsing. Field names are
//! `camelCase` on the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ─── Conversation Content ───────────────────────────────────────────────────

/// Author of a `Content` turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentRole {
    User,
    /// Response candidates sometimes omit the role; they are always the model's.
    #[default]
    Model,
}

/// One turn of the model-facing conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub role: ContentRole,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A user turn holding a single text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: ContentRole::User,
            parts: vec![Part::text(text)],
        }
    }

    /// A model turn holding a single text part.
    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: ContentRole::Model,
            parts: vec![Part::text(text)],
        }
    }
}

/// A single part of a turn: text, a function call, or a function response.
///
/// Unknown fields (e.g. `thoughtSignature`) are kept in `extra` so the model's
/// own turns can be echoed back verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            function_call: Some(call),
            ..Self::default()
        }
    }

    pub fn function_response(response: FunctionResponse) -> Self {
        Self {
            function_response: Some(response),
            ..Self::default()
        }
    }

    /// Thinking-model summaries are flagged with `thought: true`.
    pub fn is_thought(&self) -> bool {
        self.extra
            .get("thought")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default = "empty_object")]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// The outcome of a function call, sent back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

// ─── Request Types ──────────────────────────────────────────────────────────

/// A callable function advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub parameters: Value,
}

/// Tool block of the request; only function declarations are used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// The system instruction carries no role, only parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInstruction {
    pub parts: Vec<Part>,
}

impl SystemInstruction {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
        }
    }
}

/// Sampling overrides.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Request body for `:generateContent` and `:streamGenerateContent`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    pub system_instruction: SystemInstruction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    /// Names of all declared functions, for logging and assertions.
    pub fn declared_function_names(&self) -> Vec<&str> {
        self.tools
            .iter()
            .flat_map(|t| t.function_declarations.iter())
            .map(|d| d.name.as_str())
            .collect()
    }
}

// ─── Response Types ─────────────────────────────────────────────────────────

/// A full response, or one fragment of a streamed response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

impl GenerateContentResponse {
    /// Parts of the first candidate, or an empty slice.
    pub fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: Option<u32>,
    #[serde(default)]
    pub candidates_token_count: Option<u32>,
}

// ─── Reply Interpretation ───────────────────────────────────────────────────

/// A model turn split into its function calls and its answer text.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    /// The model's parts as received, echoed back into history on a tool round.
    pub parts: Vec<Part>,
    pub function_calls: Vec<FunctionCall>,
    /// Concatenation of all non-thought text parts.
    pub text: String,
    /// Why generation stopped (`STOP`, `MAX_TOKENS`, `SAFETY`, ...), from the
    /// last fragment that carried one.
    pub finish_reason: Option<String>,
}

impl ModelReply {
    /// Fold a batch of parts into the reply.
    pub fn absorb(&mut self, parts: &[Part]) {
        for part in parts {
            if let Some(call) = &part.function_call {
                self.function_calls.push(call.clone());
            } else if let Some(text) = &part.text {
                if !part.is_thought() {
                    self.text.push_str(text);
                }
            }
            self.parts.push(part.clone());
        }
    }

    /// Fold a full response or one streamed fragment into the reply.
    pub fn absorb_response(&mut self, response: &GenerateContentResponse) {
        self.absorb(response.first_parts());
        if let Some(reason) = response
            .candidates
            .first()
            .and_then(|c| c.finish_reason.clone())
        {
            self.finish_reason = Some(reason);
        }
    }

    pub fn from_response(response: &GenerateContentResponse) -> Self {
        let mut reply = Self::default();
        reply.absorb_response(response);
        reply
    }

    pub fn has_function_calls(&self) -> bool {
        !self.function_calls.is_empty()
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// The model turn to append to history before the function results.
    pub fn function_call_content(&self) -> Content {
        Content {
            role: ContentRole::Model,
            parts: self
                .parts
                .iter()
                .filter(|p| p.function_call.is_some() || p.text.is_some())
                .cloned()
                .collect(),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
