//! Tool registry: the callable tools listed by the static manifest.
//!
//! Provides:
//! - Loading the manifest from a URL or a file, once per session
//! - Deriving each tool's REST binding (structured fields, else the
//!   `Использует API эндпоинт METHOD endpoint` description convention)
//! - Mode-filtered function declarations for the model

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::agent_core::types::AiMode;
use crate::inference::types::FunctionDeclaration;

use super::errors::ToolError;
use super::front::FRONT_TOOL_NAMES;
use super::types::{HttpBinding, HttpMethod, ManifestEntry, ToolDefinition};

/// Description convention that binds a tool to a backend endpoint.
const BINDING_PATTERN: &str = r"Использует API эндпоинт (GET|POST|PUT|DELETE) (\S+)";

fn binding_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(BINDING_PATTERN).expect("binding pattern is valid"))
}

// ─── Manifest Source ────────────────────────────────────────────────────────

/// Where the manifest is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    Url(String),
    File(std::path::PathBuf),
}

impl ManifestSource {
    /// `http://` and `https://` locations are fetched; anything else is a path.
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            ManifestSource::Url(location.to_string())
        } else {
            ManifestSource::File(crate::config::expand_home(location).into())
        }
    }

    pub fn location(&self) -> String {
        match self {
            ManifestSource::Url(url) => url.clone(),
            ManifestSource::File(path) => path.display().to_string(),
        }
    }
}

// ─── ToolRegistry ───────────────────────────────────────────────────────────

/// Immutable set of tools for one session, in manifest order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build a registry from parsed manifest entries.
    pub fn from_entries(entries: Vec<ManifestEntry>) -> Self {
        let mut tools = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());

        for entry in entries {
            let binding = derive_binding(&entry);
            if binding.is_none() && !FRONT_TOOL_NAMES.contains(&entry.name.as_str()) {
                tracing::warn!(
                    tool = %entry.name,
                    "manifest entry has no API binding and no front handler"
                );
            }
            let def = ToolDefinition {
                name: entry.name,
                description: entry.description,
                parameters: entry.parameters,
                binding,
            };
            if let Some(existing) = index.get(&def.name) {
                tracing::warn!(tool = %def.name, "duplicate manifest entry, keeping the last one");
                tools[*existing] = def;
            } else {
                index.insert(def.name.clone(), tools.len());
                tools.push(def);
            }
        }

        Self { tools, index }
    }

    /// Parse manifest JSON text.
    pub fn from_json(location: &str, raw: &str) -> Result<Self, ToolError> {
        let entries: Vec<ManifestEntry> =
            serde_json::from_str(raw).map_err(|e| ToolError::ManifestMalformed {
                location: location.to_string(),
                reason: e.to_string(),
            })?;

        if entries.is_empty() {
            return Err(ToolError::ManifestEmpty {
                location: location.to_string(),
            });
        }

        let registry = Self::from_entries(entries);
        tracing::info!(
            location = %location,
            tools = registry.len(),
            front_tools = registry.tools.iter().filter(|t| t.is_front_tool()).count(),
            "tool manifest loaded"
        );
        Ok(registry)
    }

    /// Fetch or read the manifest. No retry on failure.
    pub async fn load(source: &ManifestSource, http: &reqwest::Client) -> Result<Self, ToolError> {
        let location = source.location();
        let raw = match source {
            ManifestSource::Url(url) => {
                let response = http.get(url).send().await.map_err(|e| {
                    ToolError::ManifestUnavailable {
                        location: location.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(ToolError::ManifestUnavailable {
                        location,
                        reason: format!("HTTP {}", status.as_u16()),
                    });
                }
                response
                    .text()
                    .await
                    .map_err(|e| ToolError::ManifestUnavailable {
                        location: location.clone(),
                        reason: e.to_string(),
                    })?
            }
            ManifestSource::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                ToolError::ManifestUnavailable {
                    location: location.clone(),
                    reason: e.to_string(),
                }
            })?,
        };

        Self::from_json(&location, &raw)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn binding(&self, name: &str) -> Option<&HttpBinding> {
        self.get(name).and_then(|t| t.binding.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Whether a tool may be called in `mode`.
    ///
    /// Question mode admits GET-bound tools and front tools; action mode
    /// admits everything.
    pub fn is_allowed(&self, name: &str, mode: AiMode) -> bool {
        match mode {
            AiMode::Action => true,
            AiMode::Question => match self.get(name) {
                Some(def) => def.method().map_or(true, HttpMethod::is_read_only),
                None => true,
            },
        }
    }

    /// Function declarations offered to the model in `mode`.
    pub fn declarations(&self, mode: AiMode) -> Vec<FunctionDeclaration> {
        self.tools
            .iter()
            .filter(|t| self.is_allowed(&t.name, mode))
            .map(ToolDefinition::declaration)
            .collect()
    }
}

// ─── Binding Extraction ─────────────────────────────────────────────────────

/// Structured fields win; otherwise mine the description.
fn derive_binding(entry: &ManifestEntry) -> Option<HttpBinding> {
    if let (Some(method), Some(endpoint)) = (entry.method, entry.endpoint.as_ref()) {
        return Some(HttpBinding {
            method,
            endpoint: endpoint.clone(),
        });
    }
    extract_binding(&entry.description)
}

/// Extract `(METHOD, endpoint)` from a description.
///
/// Trailing sentence punctuation glued to the endpoint is dropped.
pub fn extract_binding(description: &str) -> Option<HttpBinding> {
    let caps = binding_regex().captures(description)?;
    let method = caps.get(1)?.as_str().parse().ok()?;
    let endpoint = caps
        .get(2)?
        .as_str()
        .trim_end_matches(['.', ',', ';', ':', ')'])
        .to_string();
    if endpoint.is_empty() {
        return None;
    }
    Some(HttpBinding { method, endpoint })
}

// ─── Tests ──────────────────────────────────────────────────────────────────
