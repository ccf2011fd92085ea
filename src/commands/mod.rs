//! Commands exposed to the terminal front end.
//!
//! The binary reads lines from stdin; each is either a chat message or a
//! slash command parsed here.

pub mod chat;

pub use chat::{format_models, format_transcript, ChatCommand, Input, RunRenderer, HELP_TEXT};
