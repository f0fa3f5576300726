//! Configuration loading, validation, and management for Fireside.
//!
//! Loads configuration from `~/.fireside/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use fireside_core::engine::GenerationOptions;
use fireside_core::retention::SubscriptionTier;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.fireside/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Inference engine selection and credentials
    #[serde(default)]
    pub engine: EngineConfig,

    /// Generation settings (temperature, token budget, context size)
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Storage backend selection
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retention tier
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Memory pressure monitoring
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Tracing filter directive (e.g. "info", "fireside=debug")
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "info".into()
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("engine", &self.engine)
            .field("generation", &self.generation)
            .field("storage", &self.storage)
            .field("retention", &self.retention)
            .field("monitor", &self.monitor)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Backend kind: "local" or "remote"
    #[serde(default = "default_engine_kind")]
    pub kind: String,

    /// Model to use: a preset name ("tinyllama", "smollm", "qwen:0.5b") or
    /// a path to a GGUF file for the local engine; a model identifier for
    /// the remote engine
    #[serde(default = "default_model")]
    pub model: String,

    /// Remote endpoint base URL (OpenAI-compatible)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key for the remote endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_engine_kind() -> String {
    "remote".into()
}
fn default_model() -> String {
    "tinyllama".into()
}
fn default_base_url() -> String {
    "http://localhost:11434/v1".into()
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: default_engine_kind(),
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Context window size in exchanges (user+assistant pairs)
    #[serde(default = "default_context_exchanges")]
    pub context_exchanges: usize,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_context_exchanges() -> usize {
    10
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context_exchanges: default_context_exchanges(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend kind: "file" or "memory"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Data directory for the file backend; defaults to ~/.fireside/data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_storage_backend() -> String {
    "file".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            data_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Subscription tier driving the retention policy
    #[serde(default)]
    pub tier: SubscriptionTier,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            tier: SubscriptionTier::Free,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_poll_interval() -> u64 {
    30
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.fireside/config.toml).
    ///
    /// Also checks environment variables:
    /// - `FIRESIDE_API_KEY` (falls back to `OPENAI_API_KEY`)
    /// - `FIRESIDE_ENGINE` overrides the engine kind
    /// - `FIRESIDE_MODEL` overrides the model
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.engine.api_key.is_none() {
            config.engine.api_key = std::env::var("FIRESIDE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(kind) = std::env::var("FIRESIDE_ENGINE") {
            config.engine.kind = kind;
        }

        if let Ok(model) = std::env::var("FIRESIDE_MODEL") {
            config.engine.model = model;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".fireside")
    }

    /// The data directory: the configured one, or ~/.fireside/data.
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("data"))
    }

    /// Generation options built from the configured values, clamped to
    /// their documented ranges.
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions::new()
            .with_temperature(self.generation.temperature)
            .with_max_tokens(self.generation.max_tokens)
            .with_context_exchanges(self.generation.context_exchanges)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.engine.kind.as_str(), "local" | "remote") {
            return Err(ConfigError::ValidationError(format!(
                "engine.kind must be \"local\" or \"remote\", got {:?}",
                self.engine.kind
            )));
        }

        if !matches!(self.storage.backend.as_str(), "file" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "storage.backend must be \"file\" or \"memory\", got {:?}",
                self.storage.backend
            )));
        }

        if self.generation.temperature < 0.0 || self.generation.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.monitor.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "monitor.poll_interval_secs must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `fireside init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            generation: GenerationConfig::default(),
            storage: StorageConfig::default(),
            retention: RetentionConfig::default(),
            monitor: MonitorConfig::default(),
            log_filter: default_log_filter(),
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
