//! Configuration loading, validation, and management for MicroClaw.
//!
//! Loads configuration from `~/.microclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup; the resulting
//! values are constant for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Smallest accepted history byte budget. A single truncated entry must
/// always fit inside it.
pub const MIN_HISTORY_BYTES: usize = 256;

/// The root configuration structure.
///
/// Maps directly to `~/.microclaw/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Anthropic API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Messages API endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Max tokens per model response (kept low to save device RAM)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,

    /// Conversation history caps
    #[serde(default)]
    pub history: HistoryConfig,

    /// Retry and backoff settings for transient transport failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Agent loop and scheduling
    #[serde(default)]
    pub agent: AgentConfig,

    /// Board capabilities exposed as tools
    #[serde(default)]
    pub board: BoardConfig,
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".into()
}
fn default_model() -> String {
    "claude-3-5-haiku-20241022".into()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_api_timeout_secs() -> u64 {
    30
}

/// Redact a secret string for Debug output.
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
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("history", &self.history)
            .field("retry", &self.retry)
            .field("agent", &self.agent)
            .field("board", &self.board)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of non-system entries kept
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Approximate serialized-size ceiling for those entries
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_max_entries() -> usize {
    12
}
fn default_max_bytes() -> usize {
    16 * 1024
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_bytes: default_max_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total send attempts per model turn, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubles on every further attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff ceiling
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Permanent system message
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Tool-dispatch rounds allowed in one cycle
    #[serde(default = "default_max_iterations")]
    pub max_iterations_per_cycle: u32,

    /// Seconds between the starts of two scheduled cycles
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Prompt sent at the start of every scheduled cycle
    #[serde(default = "default_recurring_prompt")]
    pub recurring_prompt: String,

    /// Clear history after every handled event
    #[serde(default = "default_true")]
    pub reset_after_event: bool,
}

fn default_system_prompt() -> String {
    "You are an autonomous agent running on a microcontroller. \
     Use the available tools to inspect and control the board. \
     Keep answers short."
        .into()
}
fn default_max_iterations() -> u32 {
    10
}
fn default_interval_seconds() -> u64 {
    300
}
fn default_recurring_prompt() -> String {
    "Check the board status and act if anything needs attention.".into()
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_iterations_per_cycle: default_max_iterations(),
            interval_seconds: default_interval_seconds(),
            recurring_prompt: default_recurring_prompt(),
            reset_after_event: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// GPIO pins the model may touch (empty = all pins)
    #[serde(default = "default_allowed_pins")]
    pub allowed_pins: Vec<u8>,

    /// LEDs on the addressable strip (0 = no strip tools)
    #[serde(default = "default_led_count")]
    pub led_count: usize,

    /// Register `http_get` / `http_post`
    #[serde(default)]
    pub webhooks: bool,
}

fn default_allowed_pins() -> Vec<u8> {
    vec![2, 4, 5, 12, 13, 14, 15]
}
fn default_led_count() -> usize {
    8
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            allowed_pins: default_allowed_pins(),
            led_count: default_led_count(),
            webhooks: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.microclaw/config.toml).
    ///
    /// Also checks environment variables:
    /// - `MICROCLAW_API_KEY` (highest priority)
    /// - `ANTHROPIC_API_KEY`
    /// - `MICROCLAW_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("MICROCLAW_API_KEY").or_else(|| {
            if self.api_key.is_none() {
                lookup("ANTHROPIC_API_KEY")
            } else {
                None
            }
        }) {
            self.api_key = Some(key);
        }

        if let Some(model) = lookup("MICROCLAW_MODEL") {
            self.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".microclaw")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError("max_tokens must be > 0".into()));
        }
        if self.api_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "api_timeout_secs must be > 0".into(),
            ));
        }
        if self.history.max_entries == 0 {
            return Err(ConfigError::ValidationError(
                "history.max_entries must be > 0".into(),
            ));
        }
        if self.history.max_bytes < MIN_HISTORY_BYTES {
            return Err(ConfigError::ValidationError(format!(
                "history.max_bytes must be >= {MIN_HISTORY_BYTES}"
            )));
        }
        if self.retry.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_retries must be >= 1".into(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        if self.agent.max_iterations_per_cycle == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations_per_cycle must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_timeout_secs: default_api_timeout_secs(),
            history: HistoryConfig::default(),
            retry: RetryConfig::default(),
            agent: AgentConfig::default(),
            board: BoardConfig::default(),
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
