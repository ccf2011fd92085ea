//! Assistant configuration loading and validation.
//!
//! Reads `assistant.yaml` and resolves environment variables. The file is the
//! single source of truth for the generative endpoint, the model variants, the
//! library backend and the tool manifest location.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::types::AiMode;

// ─── Constants ──────────────────────────────────────────────────────────────

/// File name searched for when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "assistant.yaml";

/// Env var that points directly at a config file.
pub const CONFIG_PATH_ENV: &str = "LIBRARY_ASSISTANT_CONFIG";

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Errors raised while locating, reading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find {CONFIG_FILE_NAME} (searched upward from {searched_from})")]
    NotFound { searched_from: String },

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("model '{key}' not found in config")]
    UnknownModel { key: String },
}

// ─── Public Types ───────────────────────────────────────────────────────────

/// A single generative model variant.
///
/// Capabilities are explicit per variant; nothing in the agent branches on the
/// model name.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelVariant {
    /// Config key, filled in after loading.
    #[serde(skip)]
    pub key: String,
    pub display_name: String,
    /// Name sent on the wire. Defaults to the config key.
    #[serde(default)]
    pub model_name: Option<String>,
    /// Use `streamGenerateContent` instead of `generateContent`.
    #[serde(default)]
    pub streaming: bool,
    /// Whether tool declarations are sent and function calls honoured.
    #[serde(default = "default_true")]
    pub supports_tool_calls: bool,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl ModelVariant {
    /// The model identifier used in the request path.
    pub fn wire_name(&self) -> &str {
        self.model_name.as_deref().unwrap_or(&self.key)
    }
}

/// Generative-language endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerativeConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub default_model: String,
    pub models: HashMap<String, ModelVariant>,
    #[serde(default = "default_generative_timeout")]
    pub request_timeout_secs: u64,
}

/// Library backend REST API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    /// File holding the bearer token (what the browser kept in local storage).
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// Env var consulted before the token file.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_backend_timeout")]
    pub request_timeout_secs: u64,
}

/// Where the static tool manifest lives.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    /// `http(s)://` URL or filesystem path.
    pub manifest: String,
}

/// Agent loop settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub default_mode: AiMode,
    #[serde(default = "default_max_tool_result_chars")]
    pub max_tool_result_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            default_mode: AiMode::default(),
            max_tool_result_chars: default_max_tool_result_chars(),
        }
    }
}

/// Top-level configuration (mirrors `assistant.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    pub generative: GenerativeConfig,
    pub backend: BackendConfig,
    pub tools: ToolsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

fn default_true() -> bool {
    true
}
fn default_generative_timeout() -> u64 {
    120
}
fn default_backend_timeout() -> u64 {
    30
}
fn default_token_env() -> String {
    "LIBRARY_API_TOKEN".to_string()
}
fn default_max_iterations() -> u32 {
    10
}
fn default_max_tool_result_chars() -> usize {
    6_000
}

impl AssistantConfig {
    /// Resolve a model variant by key.
    pub fn model(&self, key: &str) -> Result<&ModelVariant, ConfigError> {
        self.generative
            .models
            .get(key)
            .ok_or_else(|| ConfigError::UnknownModel {
                key: key.to_string(),
            })
    }

    /// The variant named by `generative.default_model`.
    pub fn default_model(&self) -> Result<&ModelVariant, ConfigError> {
        self.model(&self.generative.default_model)
    }

    /// Model keys in stable order.
    pub fn model_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.generative.models.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        keys
    }
}

// ─── Loading ────────────────────────────────────────────────────────────────

/// Locate `assistant.yaml`.
///
/// Order: `LIBRARY_ASSISTANT_CONFIG`, then upward from `start`, then the
/// platform config directory.
pub fn find_config_path(start: &Path) -> Result<PathBuf, ConfigError> {
    if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
        let candidate = PathBuf::from(explicit);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let candidate = config_dir.join("library-assistant").join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(ConfigError::NotFound {
        searched_from: start.display().to_string(),
    })
}

/// Load and parse the configuration file.
pub fn load_config(path: &Path) -> Result<AssistantConfig, ConfigError> {
    let origin = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
        path: origin.clone(),
        reason: e.to_string(),
    })?;
    parse_config(&origin, &raw)
}

/// Parse configuration text, substituting `${VAR}` references first.
///
/// `origin` names the source in error messages.
pub fn parse_config(origin: &str, raw: &str) -> Result<AssistantConfig, ConfigError> {
    let resolved = substitute_env(raw);

    let mut config: AssistantConfig =
        serde_yaml::from_str(&resolved).map_err(|e| ConfigError::ParseFailed {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;

    for (key, variant) in config.generative.models.iter_mut() {
        variant.key = key.clone();
    }

    if !config.generative.models.contains_key(&config.generative.default_model) {
        return Err(ConfigError::UnknownModel {
            key: config.generative.default_model.clone(),
        });
    }

    Ok(config)
}

// ─── Environment References ─────────────────────────────────────────────────

fn env_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env reference pattern is valid")
    })
}

/// Replace `${VAR}` and `${VAR:-default}` with values from the environment.
///
/// An unset variable without a default becomes empty. Defaults get `~`
/// expanded, so `${TOKEN_FILE:-~/.library/token}` works unquoted.
fn substitute_env(raw: &str) -> Cow<'_, str> {
    env_reference().replace_all(raw, |caps: &Captures<'_>| match std::env::var(&caps[1]) {
        Ok(value) => value,
        Err(_) => caps
            .get(2)
            .map(|default| expand_home(default.as_str()))
            .unwrap_or_default(),
    })
}

/// Expand `~` and `~/...` to the user's home directory. `~user` forms are
/// left alone.
pub(crate) fn expand_home(path: &str) -> String {
    let Some(rest) = path.strip_prefix('~') else {
        return path.to_string();
    };
    if !(rest.is_empty() || rest.starts_with('/')) {
        return path.to_string();
    }
    match dirs::home_dir() {
        Some(home) => format!("{}{rest}", home.display()),
        None => path.to_string(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
