//! Configuration loading, validation, and management for sessionloom.
//!
//! Loads configuration from `~/.sessionloom/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.sessionloom/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider name ("openai", "openrouter", "ollama", or "custom")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL override for OpenAI-compatible endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model used for every capability call
    #[serde(default = "default_model")]
    pub model: String,

    /// Temperature for answer generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout for the provider
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Memory / consolidation configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Turn pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_request_timeout_secs() -> u64 {
    120
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("memory", &self.memory)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Where the persisted state lives. Defaults to `~/.sessionloom/session_memory.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,

    /// Token budget of the short-term buffer
    #[serde(default = "default_threshold_tokens")]
    pub threshold_tokens: usize,

    /// Fraction of the budget at which consolidation fires
    #[serde(default = "default_trigger_ratio")]
    pub trigger_ratio: f32,

    /// Most recent turns kept raw after a consolidation (0 = clear the buffer)
    #[serde(default)]
    pub keep_tail_turns: usize,
}

fn default_threshold_tokens() -> usize {
    200
}
fn default_trigger_ratio() -> f32 {
    1.0
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            state_path: None,
            threshold_tokens: default_threshold_tokens(),
            trigger_ratio: default_trigger_ratio(),
            keep_tail_turns: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of most recent turns handed to the guardrail and rewriter
    #[serde(default = "default_recent_turns")]
    pub recent_turns: usize,

    /// Share of a reply's content words that must match a pending
    /// interpretation for the reply to count as a choice
    #[serde(default = "default_selection_threshold")]
    pub selection_threshold: f32,

    /// Synchronous retries of a failed guardrail call (0 or 1)
    #[serde(default = "default_guardrail_retries")]
    pub guardrail_retries: u32,
}

fn default_recent_turns() -> usize {
    5
}
fn default_selection_threshold() -> f32 {
    0.5
}
fn default_guardrail_retries() -> u32 {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recent_turns: default_recent_turns(),
            selection_threshold: default_selection_threshold(),
            guardrail_retries: default_guardrail_retries(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.sessionloom/config.toml).
    ///
    /// Environment overrides:
    /// - `SESSIONLOOM_API_KEY`, then `OPENAI_API_KEY` (when no key is configured)
    /// - `SESSIONLOOM_PROVIDER`, `SESSIONLOOM_MODEL`
    /// - `SESSIONLOOM_MEMORY_THRESHOLD`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = lookup("SESSIONLOOM_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("SESSIONLOOM_PROVIDER") {
            self.provider = provider;
        }

        if let Some(model) = lookup("SESSIONLOOM_MODEL") {
            self.model = model;
        }

        if let Some(raw) = lookup("SESSIONLOOM_MEMORY_THRESHOLD") {
            self.memory.threshold_tokens = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "SESSIONLOOM_MEMORY_THRESHOLD must be a positive integer, got '{raw}'"
                ))
            })?;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".sessionloom")
    }

    /// Resolved location of the persisted state file.
    pub fn state_path(&self) -> PathBuf {
        self.memory
            .state_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("session_memory.json"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.memory.threshold_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "memory.threshold_tokens must be > 0".into(),
            ));
        }

        if !(self.memory.trigger_ratio > 0.0 && self.memory.trigger_ratio <= 1.0) {
            return Err(ConfigError::ValidationError(
                "memory.trigger_ratio must be in (0.0, 1.0]".into(),
            ));
        }

        if !(self.pipeline.selection_threshold > 0.0 && self.pipeline.selection_threshold <= 1.0) {
            return Err(ConfigError::ValidationError(
                "pipeline.selection_threshold must be in (0.0, 1.0]".into(),
            ));
        }

        if self.pipeline.guardrail_retries > 1 {
            return Err(ConfigError::ValidationError(
                "pipeline.guardrail_retries must be 0 or 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: None,
            model: default_model(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
            memory: MemoryConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.memory.threshold_tokens, 200);
        assert_eq!(config.pipeline.recent_turns, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.memory.threshold_tokens, config.memory.threshold_tokens);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_trigger_ratio_rejected() {
        let mut config = AppConfig::default();
        config.memory.trigger_ratio = 1.5;
        assert!(config.validate().is_err());
        config.memory.trigger_ratio = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn guardrail_retries_capped_at_one() {
        let mut config = AppConfig::default();
        config.pipeline.guardrail_retries = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        let config = result.unwrap();
        assert_eq!(config.provider, "openai");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "model = \"gpt-4o-mini\"\n[memory]\nthreshold_tokens = 500\nkeep_tail_turns = 2").unwrap();

        let config = AppConfig::load_from(tmp.path()).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.memory.threshold_tokens, 500);
        assert_eq!(config.memory.keep_tail_turns, 2);
        assert!((config.memory.trigger_ratio - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "this is = = not toml").unwrap();
        let err = AppConfig::load_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("SESSIONLOOM_MODEL", "gpt-4o-mini"),
            ("SESSIONLOOM_MEMORY_THRESHOLD", "350"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.memory.threshold_tokens, 350);
    }

    #[test]
    fn bad_threshold_env_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env(|k| {
            (k == "SESSIONLOOM_MEMORY_THRESHOLD").then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn explicit_state_path_wins() {
        let mut config = AppConfig::default();
        config.memory.state_path = Some(PathBuf::from("/var/lib/sessionloom/state.json"));
        assert_eq!(config.state_path(), PathBuf::from("/var/lib/sessionloom/state.json"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o"));
        assert!(toml_str.contains("threshold_tokens = 200"));
    }
}
