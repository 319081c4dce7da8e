//! Configuration management for Switchboard
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/switchboard/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{Result, SwitchboardError};

/// Main configuration for Switchboard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model server configuration
    #[serde(default)]
    pub model: ModelConfig,
    /// Engine limits
    #[serde(default)]
    pub engine: EngineConfig,
    /// Tool retry policy
    #[serde(default)]
    pub retry: RetryConfig,
    /// Session storage
    #[serde(default)]
    pub session: SessionConfig,
    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Path to the agent topology file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<PathBuf>,
}

/// Ollama-compatible model server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Host address (default: localhost)
    pub host: String,
    /// Port number (default: 11434)
    pub port: u16,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Default model for agents that don't name one
    pub name: String,
    /// Sampling temperature for routing decisions
    pub temperature: f32,
}

/// Orchestration engine limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum reasoning steps per task, across all agents and branches
    /// Default: 24
    pub max_steps: usize,
    /// Number of recent session messages included in each prompt
    /// Default: 20
    pub context_window: usize,
    /// Per-call tool timeout in milliseconds
    pub tool_timeout_ms: u64,
    /// Default wall-clock limit for a parallel fan-out in milliseconds
    pub parallel_timeout_ms: u64,
}

/// Retry policy for transient tool failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per tool call, including the first
    pub max_attempts: usize,
    /// Delay before the first retry in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay in milliseconds
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

/// Session storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum stored messages per session
    /// Default: 1000
    pub max_history: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name).ok().map(|v| v == "true" || v == "1")
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            host: env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env_parse("OLLAMA_PORT").unwrap_or(11434),
            timeout_secs: 120,
            name: env::var("SWITCHBOARD_MODEL").unwrap_or_else(|_| "qwen3:8b".to_string()),
            temperature: 0.1,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: env_parse("SWITCHBOARD_MAX_STEPS").unwrap_or(24),
            context_window: 20,
            tool_timeout_ms: 30_000,
            parallel_timeout_ms: 120_000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: env_parse("SWITCHBOARD_TOOL_ATTEMPTS").unwrap_or(3),
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { max_history: 1000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: env::var("SWITCHBOARD_LOG").unwrap_or_else(|_| "info".to_string()),
            json: env_flag("SWITCHBOARD_LOG_JSON").unwrap_or(false),
        }
    }
}

impl EngineConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn parallel_timeout(&self) -> Duration {
        Duration::from_millis(self.parallel_timeout_ms)
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("switchboard")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = Self::load_from(&Self::config_file()).unwrap_or_default();
        config.apply_env();
        config
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SwitchboardError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| SwitchboardError::config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| SwitchboardError::config(format!("Failed to parse config: {}", e)))
    }

    /// Environment variables win over the config file
    pub fn apply_env(&mut self) {
        if let Ok(host) = env::var("OLLAMA_HOST") {
            self.model.host = host;
        }
        if let Some(port) = env_parse("OLLAMA_PORT") {
            self.model.port = port;
        }
        if let Ok(model) = env::var("SWITCHBOARD_MODEL") {
            self.model.name = model;
        }
        if let Some(steps) = env_parse("SWITCHBOARD_MAX_STEPS") {
            self.engine.max_steps = steps;
        }
        if let Some(attempts) = env_parse("SWITCHBOARD_TOOL_ATTEMPTS") {
            self.retry.max_attempts = attempts;
        }
        if let Ok(path) = env::var("SWITCHBOARD_TOPOLOGY") {
            self.topology = Some(PathBuf::from(path));
        }
        if let Ok(level) = env::var("SWITCHBOARD_LOG") {
            self.logging.level = level;
        }
        if let Some(json) = env_flag("SWITCHBOARD_LOG_JSON") {
            self.logging.json = json;
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file();
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| {
                    SwitchboardError::config(format!("Failed to create config dir: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SwitchboardError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content)
            .map_err(|e| SwitchboardError::config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Get the full model server URL
    pub fn model_url(&self) -> String {
        format!("http://{}:{}", self.model.host, self.model.port)
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}
