//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/hindsight/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/hindsight/` (~/.config/hindsight/)
//! - State/Logs: `$XDG_STATE_HOME/hindsight/` (~/.local/state/hindsight/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Analysis collaborator configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Batching and orchestration settings
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Transcript store location
    #[serde(default)]
    pub store: StoreConfig,

    /// Self-pollution guard settings
    #[serde(default)]
    pub guard: GuardConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// LLM provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// HTTP request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Path to the `claude` executable (claude-cli provider only)
    pub cli_path: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            endpoint: None,
            api_key: None,
            timeout_secs: default_llm_timeout(),
            cli_path: None,
        }
    }
}

fn default_provider() -> LlmProvider {
    LlmProvider::ClaudeCli
}

fn default_model() -> String {
    "sonnet".to_string()
}

fn default_llm_timeout() -> u64 {
    300
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// The `claude` CLI in print mode
    #[serde(rename = "claude-cli")]
    ClaudeCli,
    Ollama,
    Claude,
    OpenAI,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::ClaudeCli => "",
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Claude => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
        }
    }
}

/// Batching and orchestration configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Token ceiling for one batch
    #[serde(default = "default_max_batch_tokens")]
    pub max_batch_tokens: usize,

    /// Delay between consecutive collaborator calls in milliseconds
    #[serde(default = "default_call_delay_ms")]
    pub call_delay_ms: u64,

    /// Only analyze the newest N sessions
    #[serde(default)]
    pub max_sessions: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_batch_tokens: default_max_batch_tokens(),
            call_delay_ms: default_call_delay_ms(),
            max_sessions: None,
        }
    }
}

fn default_max_batch_tokens() -> usize {
    50_000
}

fn default_call_delay_ms() -> u64 {
    1000
}

/// Transcript store location
#[derive(Debug, Deserialize, Default, Clone)]
pub struct StoreConfig {
    /// Override for the Claude Code data root (defaults to ~/.claude)
    pub claude_root: Option<PathBuf>,
}

impl StoreConfig {
    /// Directory holding one subdirectory per encoded project path.
    pub fn projects_root(&self) -> PathBuf {
        self.claude_root
            .clone()
            .unwrap_or_else(|| home_dir().join(".claude"))
            .join("projects")
    }
}

/// Self-pollution guard configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GuardConfig {
    /// Enable/disable the guard
    #[serde(default = "default_guard_enabled")]
    pub enabled: bool,

    /// How many times to look for a new session file after a call
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,

    /// Pause between polls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: default_guard_enabled(),
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_guard_enabled() -> bool {
    true
}

fn default_poll_attempts() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    250
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.analysis.max_batch_tokens == 0 {
            return Err(Error::Config(
                "analysis.max_batch_tokens must be greater than 0".to_string(),
            ));
        }
        if self.llm.provider != LlmProvider::ClaudeCli && self.llm.model.trim().is_empty() {
            return Err(Error::Config("llm.model must not be empty".to_string()));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/hindsight/config.toml` (~/.config/hindsight/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("hindsight").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/hindsight/` (~/.local/state/hindsight/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("hindsight")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
