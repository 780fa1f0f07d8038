//! Configuration loading, validation, and management for Mnemos.
//!
//! Loads configuration from `~/.mnemos/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.mnemos/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM endpoint settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Long-term memory store
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Dispatch loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Page fetching
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Portfolio simulation thresholds and costs
    #[serde(default)]
    pub trading: TradingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OpenAI-compatible base URL (without `/chat/completions`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// HTTP timeout for a single completion request
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Embedding model for the vector store. Empty selects substring search.
    #[serde(default)]
    pub embedding_model: String,
}

fn default_base_url() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1".into()
}
fn default_model() -> String {
    "qwen-plus".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_provider_timeout() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            api_key: None,
            timeout_secs: default_provider_timeout(),
            embedding_model: String::new(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

/// When finished turns are written to long-term memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoSaveMode {
    Always,
    OnChange,
    Off,
}

impl std::str::FromStr for AutoSaveMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" | "true" | "1" | "yes" => Ok(Self::Always),
            "on_change" | "onchange" => Ok(Self::OnChange),
            "off" | "false" | "0" | "no" => Ok(Self::Off),
            other => Err(ConfigError::ValidationError(format!(
                "unknown auto_save mode '{other}' (expected always, on_change or off)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Base path of the store files; `~` is expanded.
    #[serde(default = "default_store_path")]
    pub store_path: String,

    #[serde(default = "default_max_items")]
    pub max_items: usize,

    #[serde(default = "default_auto_save")]
    pub auto_save: AutoSaveMode,

    #[serde(default = "default_true")]
    pub summarize: bool,

    #[serde(default = "default_min_length_to_summarize")]
    pub min_length_to_summarize: usize,

    /// Hits prepended to each model call
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,
}

fn default_store_path() -> String {
    "~/.mnemos/memory".into()
}
fn default_max_items() -> usize {
    10_000
}
fn default_auto_save() -> AutoSaveMode {
    AutoSaveMode::Always
}
fn default_min_length_to_summarize() -> usize {
    200
}
fn default_recall_limit() -> usize {
    5
}
fn default_true() -> bool {
    true
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            max_items: default_max_items(),
            auto_save: default_auto_save(),
            summarize: true,
            min_length_to_summarize: default_min_length_to_summarize(),
            recall_limit: default_recall_limit(),
        }
    }
}

impl MemoryConfig {
    /// The store base path with a leading `~` expanded.
    pub fn resolved_store_path(&self) -> PathBuf {
        expand_home(&self.store_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Tool rounds per turn before the forced final answer
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Deadline for each model or tool call
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Cumulative dialogue context cap
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Replaces the generated system prompt when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_rounds() -> usize {
    3
}
fn default_call_timeout() -> u64 {
    90
}
fn default_worker_pool_size() -> usize {
    4
}
fn default_max_context_chars() -> usize {
    24_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            call_timeout_secs: default_call_timeout(),
            worker_pool_size: default_worker_pool_size(),
            max_context_chars: default_max_context_chars(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// First-attempt timeout; doubled on every retry
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_fetch_retries")]
    pub max_retries: u32,

    /// Headless browser binary. Searched on PATH when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
}

fn default_fetch_timeout() -> u64 {
    15
}
fn default_fetch_retries() -> u32 {
    2
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_retries: default_fetch_retries(),
            browser: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_stop_loss")]
    pub stop_loss_pct: f64,

    #[serde(default = "default_take_profit")]
    pub take_profit_pct: f64,

    #[serde(default = "default_slippage")]
    pub slippage_pct: f64,

    #[serde(default = "default_fee")]
    pub fee_pct: f64,

    /// Largest share of total value a single holding may take
    #[serde(default = "default_max_position")]
    pub max_position_pct: f64,
}

fn default_stop_loss() -> f64 {
    0.10
}
fn default_take_profit() -> f64 {
    0.05
}
fn default_slippage() -> f64 {
    0.0005
}
fn default_fee() -> f64 {
    0.0003
}
fn default_max_position() -> f64 {
    0.2
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: default_stop_loss(),
            take_profit_pct: default_take_profit(),
            slippage_pct: default_slippage(),
            fee_pct: default_fee(),
            max_position_pct: default_max_position(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// File log level (`RUST_LOG` takes precedence)
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_console_level")]
    pub console_level: String,

    /// Debug log file; `None` disables the file layer
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_console_level() -> String {
    "warn".into()
}

fn default_log_file() -> Option<String> {
    Some("agent-debug.log".into())
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console_level: default_console_level(),
            file: default_log_file(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or `~/.mnemos/config.toml` when `None`,
    /// then apply environment overrides and validate.
    ///
    /// API key lookup order when the file carries none:
    /// - `MNEMOS_API_KEY`
    /// - `DASHSCOPE_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(path.unwrap_or(&default_path))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path. A missing file yields defaults.
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
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.provider.api_key.is_none() {
            self.provider.api_key = lookup("MNEMOS_API_KEY")
                .or_else(|| lookup("DASHSCOPE_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(model) = lookup("MNEMOS_MODEL") {
            self.provider.model = model;
        }
        if let Some(url) = lookup("MNEMOS_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(model) = lookup("AGENT_EMBEDDING_MODEL_PATH") {
            self.provider.embedding_model = model;
        }

        if let Some(path) = lookup("AGENT_VECTOR_STORE_PATH") {
            self.memory.store_path = path;
        }
        if let Some(max) = lookup("AGENT_MAX_MEMORY_ITEMS") {
            self.memory.max_items = parse_env("AGENT_MAX_MEMORY_ITEMS", &max)?;
        }
        if let Some(mode) = lookup("AGENT_AUTO_SAVE") {
            self.memory.auto_save = mode.parse()?;
        }
        if let Some(flag) = lookup("AGENT_MEMORY_SUMMARIZE") {
            self.memory.summarize =
                matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(min) = lookup("AGENT_MIN_LENGTH_TO_SUMMARIZE") {
            self.memory.min_length_to_summarize = parse_env("AGENT_MIN_LENGTH_TO_SUMMARIZE", &min)?;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_ascii_lowercase();
        }
        if let Some(level) = lookup("LOG_CONSOLE_LEVEL") {
            self.logging.console_level = level.to_ascii_lowercase();
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".mnemos")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.memory.max_items == 0 {
            return Err(ConfigError::ValidationError(
                "memory.max_items must be > 0".into(),
            ));
        }

        if self.agent.worker_pool_size == 0 {
            return Err(ConfigError::ValidationError(
                "agent.worker_pool_size must be > 0".into(),
            ));
        }

        if self.agent.call_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.call_timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} has an invalid value: '{value}'")))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs_home();
    }
    match path.strip_prefix("~/") {
        Some(rest) => dirs_home().join(rest),
        None => PathBuf::from(path),
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
