//! Configuration loading, validation, and management for Promptline.
//!
//! Loads configuration from `~/.promptline/config.toml` with environment
//! variable overrides. Everything is validated at load time so a bad model
//! name, missing key or malformed retry policy fails at startup rather than
//! on the first call.

use promptline_core::InvocationSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.promptline/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model every request and probe is addressed to
    #[serde(default = "default_model")]
    pub model: String,

    /// Default max tokens per reply
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Sampling temperature; backend default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Backend transport settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Retry policy shared by dispatch and token probes
    #[serde(default)]
    pub retry: RetryConfig,

    /// Token estimator settings
    #[serde(default)]
    pub estimator: EstimatorConfig,

    /// Declared operations, registered at startup
    #[serde(default)]
    pub operations: Vec<OperationConfig>,
}

fn default_model() -> String {
    "claude-3-5-haiku-20241022".into()
}
fn default_max_output_tokens() -> u32 {
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
            .field("model", &self.model)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("provider", &self.provider)
            .field("retry", &self.retry)
            .field("estimator", &self.estimator)
            .field("operations", &self.operations)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Transport-level request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_api_version() -> String {
    "2023-06-01".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            api_version: default_api_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Per-attempt timeout; classified as a retriable timeout when hit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_secs: Option<u64>,
}

fn default_max_retries() -> u32 {
    2
}
fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    1.5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            attempt_timeout_secs: None,
        }
    }
}

/// Settings for the tool-specification probe.
///
/// Tool specifications are measured alongside a placeholder user turn and
/// the placeholder's cost is subtracted. `placeholder_tokens` must be the
/// backend's cost for exactly `placeholder_text`; change both together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    #[serde(default = "default_placeholder_text")]
    pub placeholder_text: String,

    #[serde(default = "default_placeholder_tokens")]
    pub placeholder_tokens: u32,
}

fn default_placeholder_text() -> String {
    "dummy".into()
}
fn default_placeholder_tokens() -> u32 {
    1
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            placeholder_text: default_placeholder_text(),
            placeholder_tokens: default_placeholder_tokens(),
        }
    }
}

/// One declared operation: a name plus its invocation spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationConfig {
    pub name: String,

    #[serde(flatten)]
    pub spec: InvocationSpec,
}

impl AppConfig {
    /// Load configuration from the default path (~/.promptline/config.toml).
    ///
    /// Also checks environment variables:
    /// - `PROMPTLINE_API_KEY` (highest priority)
    /// - `ANTHROPIC_API_KEY`
    /// - `PROMPTLINE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from a specific path, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("PROMPTLINE_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("PROMPTLINE_MODEL") {
            config.model = model;
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
        dirs_home().join(".promptline")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be blank".into()));
        }

        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "temperature must be between 0.0 and 1.0".into(),
                ));
            }
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "retry.backoff_multiplier must be >= 1.0".into(),
            ));
        }

        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(ConfigError::ValidationError(
                "retry.max_backoff_ms must be >= retry.initial_backoff_ms".into(),
            ));
        }

        if self.estimator.placeholder_text.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "estimator.placeholder_text must not be blank".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for op in &self.operations {
            if op.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "operation name must not be blank".into(),
                ));
            }
            if !seen.insert(op.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate operation '{}'",
                    op.name
                )));
            }
        }

        Ok(())
    }

    /// Stricter check run before building a live backend: the API key must
    /// be present and non-blank.
    pub fn validate_for_dispatch(&self) -> Result<(), ConfigError> {
        self.validate()?;
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(ConfigError::ValidationError("api_key must not be blank".into())),
        }
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            max_output_tokens: default_max_output_tokens(),
            temperature: None,
            provider: ProviderConfig::default(),
            retry: RetryConfig::default(),
            estimator: EstimatorConfig::default(),
            operations: vec![],
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

impl From<ConfigError> for promptline_core::Error {
    fn from(err: ConfigError) -> Self {
        promptline_core::Error::config(err.to_string())
    }
}
