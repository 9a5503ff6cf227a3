//! Configuration loading, validation, and management for OpsClaw.
//!
//! Loads configuration from `~/.opsclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.opsclaw/config.toml`. Every field has a default, so
/// an empty or missing file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model endpoint
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Text-retrieval endpoint
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Agent loop bounds
    #[serde(default)]
    pub agent: AgentConfig,

    /// Task queue and worker pool
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Tool execution limits and privilege escalation
    #[serde(default)]
    pub tools: ToolsConfig,

    /// HTTP surface
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Task transcript storage
    #[serde(default)]
    pub task_log: TaskLogConfig,
}

fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_model_endpoint() -> String {
    "http://127.0.0.1:8080/v1".into()
}
fn default_model() -> String {
    "local".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    300
}
fn default_model_timeout() -> u64 {
    180
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_model_endpoint(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_model_timeout(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// When false, tasks run with empty context and no retrieval calls are made
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_retrieval_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,

    /// Hits kept per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Characters kept per hit
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

fn default_retrieval_endpoint() -> String {
    "http://127.0.0.1:7000".into()
}
fn default_retrieval_timeout() -> u64 {
    5
}
fn default_top_k() -> usize {
    3
}
fn default_snippet_chars() -> usize {
    300
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_retrieval_endpoint(),
            timeout_secs: default_retrieval_timeout(),
            top_k: default_top_k(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum steps per task. Per-task overrides are capped by this.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Consecutive unparseable responses before the task is failed
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Treat unknown argument keys as `invalid_args` instead of ignoring them
    #[serde(default)]
    pub reject_unknown_args: bool,
}

fn default_max_steps() -> u32 {
    15
}
fn default_max_consecutive_failures() -> u32 {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_consecutive_failures: default_max_consecutive_failures(),
            reject_unknown_args: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_worker_pool_size() -> usize {
    2
}
fn default_queue_capacity() -> usize {
    16
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Package installs get their own, longer bound
    #[serde(default = "default_package_timeout")]
    pub package_timeout_secs: u64,

    /// Prefix used for privileged commands. Empty disables escalation.
    #[serde(default = "default_elevation_command")]
    pub elevation_command: Vec<String>,

    #[serde(default = "default_package_manager")]
    pub package_manager: String,

    /// Characters of stdout/stderr kept from `shell_exec`
    #[serde(default = "default_output_tail_chars")]
    pub output_tail_chars: usize,

    #[serde(default = "default_read_limit_bytes")]
    pub read_limit_bytes: usize,
}

fn default_tool_timeout() -> u64 {
    60
}
fn default_package_timeout() -> u64 {
    300
}
fn default_elevation_command() -> Vec<String> {
    vec!["sudo".into(), "-n".into()]
}
fn default_package_manager() -> String {
    "apt-get".into()
}
fn default_output_tail_chars() -> usize {
    2000
}
fn default_read_limit_bytes() -> usize {
    10_000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout(),
            package_timeout_secs: default_package_timeout(),
            elevation_command: default_elevation_command(),
            package_manager: default_package_manager(),
            output_tail_chars: default_output_tail_chars(),
            read_limit_bytes: default_read_limit_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    9000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLogConfig {
    /// Directory holding one `<task_id>.jsonl` file per task
    #[serde(default = "default_task_dir")]
    pub dir: PathBuf,
}

fn default_task_dir() -> PathBuf {
    AppConfig::config_dir().join("tasks")
}

impl Default for TaskLogConfig {
    fn default() -> Self {
        Self {
            dir: default_task_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.opsclaw/config.toml).
    ///
    /// Environment variables override the file:
    /// - `OPSCLAW_MODEL_ENDPOINT`
    /// - `OPSCLAW_MODEL`
    /// - `OPSCLAW_API_KEY`
    /// - `OPSCLAW_RETRIEVAL_ENDPOINT`
    /// - `OPSCLAW_TASK_DIR`
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

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup("OPSCLAW_MODEL_ENDPOINT") {
            self.provider.endpoint = endpoint;
        }
        if let Some(model) = lookup("OPSCLAW_MODEL") {
            self.provider.model = model;
        }
        if let Some(key) = lookup("OPSCLAW_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(endpoint) = lookup("OPSCLAW_RETRIEVAL_ENDPOINT") {
            self.retrieval.endpoint = endpoint;
        }
        if let Some(dir) = lookup("OPSCLAW_TASK_DIR") {
            self.task_log.dir = PathBuf::from(dir);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".opsclaw")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let positive = [
            ("provider.timeout_secs", self.provider.timeout_secs),
            ("provider.max_tokens", u64::from(self.provider.max_tokens)),
            ("retrieval.timeout_secs", self.retrieval.timeout_secs),
            ("agent.max_steps", u64::from(self.agent.max_steps)),
            (
                "agent.max_consecutive_failures",
                u64::from(self.agent.max_consecutive_failures),
            ),
            ("scheduler.worker_pool_size", self.scheduler.worker_pool_size as u64),
            ("scheduler.queue_capacity", self.scheduler.queue_capacity as u64),
            ("tools.tool_timeout_secs", self.tools.tool_timeout_secs),
            ("tools.package_timeout_secs", self.tools.package_timeout_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ValidationError(format!("{name} must be at least 1")));
        }

        if self.provider.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "provider.endpoint must not be empty".into(),
            ));
        }

        if self.retrieval.enabled && self.retrieval.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "retrieval.endpoint must not be empty when retrieval is enabled".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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
