//! Tool layer: what the assistant can call and how.
//!
//! Submodules:
//! - `registry`: manifest loading and REST binding derivation
//! - `rest_executor`: generic backend caller with bearer auth
//! - `front`: local tools (navigation, stop, cancel)
//! - `types`: tool definitions and HTTP bindings
//! - `errors`: tool-level error types

pub mod errors;
pub mod front;
pub mod registry;
pub mod rest_executor;
pub mod types;

pub use errors::ToolError;
pub use front::{FrontAction, FrontToolDispatcher, FrontToolResult};
pub use registry::{ManifestSource, ToolRegistry};
pub use rest_executor::{RestBackend, RestCall, RestExecutor, RestResponse};
pub use types::{HttpBinding, HttpMethod, ToolDefinition};
