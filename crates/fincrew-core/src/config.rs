//! Service configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists. Environment variables
//! override the file; CLI flags override both.

use crate::types::{BindMode, SchedulingPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_QUERY: &str = "Analyze this financial document for investment insights";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FincrewConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: BindMode,
}

/// Reasoning engine selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name. Only "ollama" is wired today.
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding uploaded documents while their job runs.
    pub data_dir: PathBuf,
    /// Query used when a request omits one or sends a blank string.
    pub default_query: String,
    pub scheduling: SchedulingPolicy,
    /// Reasoning iterations per role before the loop is cut off.
    pub max_iterations: usize,
    /// Capability invocations per minute per role. 0 disables throttling.
    pub max_calls_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub results: usize,
}

// ============================================================
// Defaults
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000, bind: BindMode::Lan }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            model: "llama3.1:8b".into(),
            base_url: "http://localhost:11434".into(),
            temperature: 0.1,
            max_tokens: 4096,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            default_query: DEFAULT_QUERY.into(),
            scheduling: SchedulingPolicy::Concurrent,
            max_iterations: 5,
            max_calls_per_minute: 30,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://google.serper.dev/search".into(),
            api_key: None,
            results: 3,
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl FincrewConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} - using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Apply `FINCREW_*` and `SERPER_API_KEY` environment overrides.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (env in production, a map in tests).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(port) = lookup("FINCREW_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(dir) = lookup("FINCREW_DATA_DIR") {
            self.pipeline.data_dir = PathBuf::from(dir);
        }
        if let Some(model) = lookup("FINCREW_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = lookup("FINCREW_LLM_URL") {
            self.llm.base_url = url;
        }
        if let Some(key) = lookup("SERPER_API_KEY").filter(|k| !k.is_empty()) {
            self.search.api_key = Some(key);
        }
        self
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
