//! Configuration loading, validation, and management for Memoria.
//!
//! Loads configuration from `~/.memoria/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.memoria/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Memory tiering configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Persona and turn pipeline settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "deepseek".into()
}
fn default_model() -> String {
    "deepseek-chat".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}

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
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("memory", &self.memory)
            .field("agent", &self.agent)
            .field("logging", &self.logging)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Short-term window and consolidation settings.
///
/// Read once when the Memory Room and Consolidation Mechanism are built;
/// changing the file mid-session has no effect until restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "sqlite" or "in_memory"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// SQLite database file (defaults to `~/.memoria/memory.sqlite`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,

    /// Short-term window ceiling
    #[serde(default = "default_max_short_term_rounds")]
    pub max_short_term_rounds: usize,

    /// Rounds between consolidation attempts
    #[serde(default = "default_update_interval")]
    pub update_interval: u32,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_max_short_term_rounds() -> usize {
    10
}
fn default_update_interval() -> u32 {
    10
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            database_path: None,
            max_short_term_rounds: default_max_short_term_rounds(),
            update_interval: default_update_interval(),
        }
    }
}

impl MemoryConfig {
    /// The SQLite file to open, falling back to the config directory.
    pub fn resolved_database_path(&self) -> PathBuf {
        match &self.database_path {
            Some(p) => PathBuf::from(p),
            None => AppConfig::config_dir().join("memory.sqlite"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Persona name shown in the CLI
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Base persona prompt; the memory summary is appended per turn
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Deadline for the reply generation call
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,

    /// Deadline for the consolidation summarizer call
    #[serde(default = "default_summarizer_timeout")]
    pub summarizer_timeout_secs: u64,

    /// Sampling temperature for extraction
    #[serde(default)]
    pub summarizer_temperature: f32,

    /// Reply shown to the user when generation fails
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
}

fn default_agent_name() -> String {
    "Little Prince".into()
}
fn default_system_prompt() -> String {
    "You are the Little Prince from asteroid B-612. You have a pure heart and a \
     boundless curiosity about the world. Talk with the user as the Little Prince: \
     gentle, kind, and treasuring friendship."
        .into()
}
fn default_generation_timeout() -> u64 {
    120
}
fn default_summarizer_timeout() -> u64 {
    60
}
fn default_fallback_reply() -> String {
    "Sorry, I ran into a problem. Please try again in a moment.".into()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            system_prompt: default_system_prompt(),
            generation_timeout_secs: default_generation_timeout(),
            summarizer_timeout_secs: default_summarizer_timeout(),
            summarizer_temperature: 0.0,
            fallback_reply: default_fallback_reply(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

const BACKENDS: [&str; 2] = ["sqlite", "in_memory"];

impl AppConfig {
    /// Load configuration from the default path (~/.memoria/config.toml).
    ///
    /// Environment variables override the file:
    /// - `MEMORIA_API_KEY` (highest priority), `DEEPSEEK_API_KEY`,
    ///   `OPENAI_API_KEY`, `OPENROUTER_API_KEY`
    /// - `MEMORIA_PROVIDER`, `MEMORIA_MODEL`
    /// - `MEMORIA_MAX_SHORT_TERM_ROUNDS`, `MEMORIA_UPDATE_INTERVAL`
    /// - `MEMORIA_LOG_LEVEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
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

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("MEMORIA_API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() {
            self.api_key = var("DEEPSEEK_API_KEY")
                .or_else(|| var("OPENAI_API_KEY"))
                .or_else(|| var("OPENROUTER_API_KEY"));
        }

        if let Some(provider) = var("MEMORIA_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = var("MEMORIA_MODEL") {
            self.default_model = model;
        }

        if let Some(rounds) = var("MEMORIA_MAX_SHORT_TERM_ROUNDS") {
            match rounds.parse() {
                Ok(n) => self.memory.max_short_term_rounds = n,
                Err(_) => tracing::warn!("Ignoring invalid MEMORIA_MAX_SHORT_TERM_ROUNDS={rounds}"),
            }
        }

        if let Some(interval) = var("MEMORIA_UPDATE_INTERVAL") {
            match interval.parse() {
                Ok(n) => self.memory.update_interval = n,
                Err(_) => tracing::warn!("Ignoring invalid MEMORIA_UPDATE_INTERVAL={interval}"),
            }
        }

        if let Some(level) = var("MEMORIA_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".memoria")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.memory.max_short_term_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "memory.max_short_term_rounds must be at least 1".into(),
            ));
        }

        if self.memory.update_interval == 0 {
            return Err(ConfigError::ValidationError(
                "memory.update_interval must be at least 1".into(),
            ));
        }

        if !BACKENDS.contains(&self.memory.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be one of {BACKENDS:?}, got '{}'",
                self.memory.backend
            )));
        }

        if self.agent.generation_timeout_secs == 0 || self.agent.summarizer_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent timeouts must be at least 1 second".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Write this configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |e: String| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason: e,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| write_err(e.to_string()))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            memory: MemoryConfig::default(),
            agent: AgentSettings::default(),
            logging: LoggingConfig::default(),
            providers: HashMap::new(),
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

    #[error("Failed to write config file at {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
