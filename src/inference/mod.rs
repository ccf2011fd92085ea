//! Inference client: generative-language API access for the assistant.
//!
//! This module handles all communication with the model endpoint:
//! - Batch (`generateContent`) and streaming (`streamGenerateContent`) calls
//! - Newline-delimited JSON fragment decoding
//! - Splitting model turns into function calls and answer text

pub mod client;
pub mod errors;
pub mod streaming;
pub mod types;

pub use client::{FragmentStream, GenerativeClient, GenerativeModel};
pub use errors::InferenceError;
pub use types::{
    Content, ContentRole, FunctionCall, FunctionDeclaration, FunctionResponse,
    GenerateContentRequest, GenerateContentResponse, ModelReply, Part,
};
