//! Shared types for the tool layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::inference::types::FunctionDeclaration;

// ─── HTTP Binding ───────────────────────────────────────────────────────────

/// HTTP verb of a REST-bound tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether parameters travel as a JSON body rather than a query string.
    pub fn sends_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    pub fn is_read_only(self) -> bool {
        self == HttpMethod::Get
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("unsupported HTTP method: {other}")),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Typed REST binding of a tool: verb plus endpoint template
/// (e.g. `/api/Books/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpBinding {
    pub method: HttpMethod,
    pub endpoint: String,
}

// ─── Manifest ───────────────────────────────────────────────────────────────

/// One entry of the static tool manifest, as served.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// Structured binding; takes precedence over the description convention.
    #[serde(default)]
    pub method: Option<HttpMethod>,
    #[serde(default, alias = "endpointTemplate")]
    pub endpoint: Option<String>,
}

// ─── Tool Definitions ───────────────────────────────────────────────────────

/// A callable tool, immutable once the registry is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    /// `None` marks a front tool handled locally.
    pub binding: Option<HttpBinding>,
}

impl ToolDefinition {
    pub fn is_front_tool(&self) -> bool {
        self.binding.is_none()
    }

    pub fn method(&self) -> Option<HttpMethod> {
        self.binding.as_ref().map(|b| b.method)
    }

    pub fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}
