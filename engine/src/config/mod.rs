//! Configuration management
//!
//! This module handles loading, validation, and management of the Foreman
//! configuration. Configuration is stored in TOML format at
//! ~/.foreman/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory, log level, HTTP bind address
//! - **planner**: Planner endpoint, model, API key source, timeout
//! - **worker**: Worker backend endpoint, timeout, fetch retry bound
//! - **orchestrator**: Iteration cap and settlement timing knobs
//!
//! # Path Expansion
//!
//! The configuration system expands a leading `~` in the data directory to
//! the user's home directory and creates the directory if missing.

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
///
/// Represents the complete Foreman configuration loaded from
/// ~/.foreman/config.toml. Every section falls back to defaults when absent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Core service settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Planner endpoint configuration
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Worker backend configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Orchestrator timing and limits
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Core service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Address the HTTP API binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

/// Planner endpoint configuration
///
/// The planner speaks an OpenAI-compatible chat-completions API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Base URL for the planner API
    #[serde(default = "default_planner_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_planner_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_planner_api_key_env")]
    pub api_key_env: String,

    /// Hard timeout per call, in seconds
    #[serde(default = "default_call_timeout")]
    pub timeout_secs: u64,
}

/// Worker backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Base URL for the worker API
    #[serde(default = "default_worker_base_url")]
    pub base_url: String,

    /// Hard timeout per call, in seconds
    #[serde(default = "default_call_timeout")]
    pub timeout_secs: u64,

    /// Bounded retries for the latest-event fetch (transient 5xx only)
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
}

/// Orchestrator timing and limits
///
/// The ordering `active_poll_secs < cooldown_secs < max_cooldown_wait_secs`
/// is validated at load time; exact values are tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Iteration cap applied when a request doesn't supply one
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,

    /// Quiet period that settles a staged worker event
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Ceiling on how long a staged event may wait before a forced flush
    #[serde(default = "default_max_cooldown_wait")]
    pub max_cooldown_wait_secs: u64,

    /// Poll interval while a staged event is waiting to settle
    #[serde(default = "default_active_poll")]
    pub active_poll_secs: u64,

    /// Poll interval while the worker is quiet
    #[serde(default = "default_idle_poll")]
    pub idle_poll_secs: u64,

    /// Delay before the very first event check after session creation
    #[serde(default = "default_first_poll_delay")]
    pub first_poll_delay_ms: u64,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.foreman")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:8700".to_string()
}

fn default_planner_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_planner_model() -> String {
    "deepseek-chat".to_string()
}

fn default_planner_api_key_env() -> String {
    "FOREMAN_PLANNER_API_KEY".to_string()
}

fn default_call_timeout() -> u64 {
    30
}

fn default_worker_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_fetch_retries() -> u32 {
    2
}

fn default_max_iterations() -> u32 {
    10
}

fn default_cooldown() -> u64 {
    30
}

fn default_max_cooldown_wait() -> u64 {
    120
}

fn default_active_poll() -> u64 {
    5
}

fn default_idle_poll() -> u64 {
    5
}

fn default_first_poll_delay() -> u64 {
    1000
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            base_url: default_planner_base_url(),
            model: default_planner_model(),
            api_key_env: default_planner_api_key_env(),
            timeout_secs: default_call_timeout(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            base_url: default_worker_base_url(),
            timeout_secs: default_call_timeout(),
            fetch_retries: default_fetch_retries(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_max_iterations: default_max_iterations(),
            cooldown_secs: default_cooldown(),
            max_cooldown_wait_secs: default_max_cooldown_wait(),
            active_poll_secs: default_active_poll(),
            idle_poll_secs: default_idle_poll(),
            first_poll_delay_ms: default_first_poll_delay(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.foreman/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default
    /// configuration. Validates the configuration after loading.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Config::default();
        config.validate_and_process()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.foreman/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".foreman").join("config.toml"))
    }

    /// Expand paths and check invariants
    ///
    /// The timing knobs must satisfy `active_poll < cooldown <
    /// max_cooldown_wait` or the settlement policy degenerates.
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        // Expand ~ in the data directory
        if let Some(rest) = self.core.data_dir.to_str().and_then(|s| s.strip_prefix("~/")) {
            let home = dirs::home_dir().ok_or_else(|| {
                EngineError::Config("Could not determine home directory".to_string())
            })?;
            self.core.data_dir = home.join(rest);
        }

        if self.orchestrator.default_max_iterations == 0 {
            return Err(EngineError::Config(
                "orchestrator.default_max_iterations must be at least 1".to_string(),
            ));
        }

        let orch = &self.orchestrator;
        if !(orch.active_poll_secs < orch.cooldown_secs
            && orch.cooldown_secs < orch.max_cooldown_wait_secs)
        {
            return Err(EngineError::Config(format!(
                "orchestrator timing must satisfy active_poll ({}) < cooldown ({}) < max_cooldown_wait ({})",
                orch.active_poll_secs, orch.cooldown_secs, orch.max_cooldown_wait_secs
            )));
        }

        if self.planner.timeout_secs == 0 || self.worker.timeout_secs == 0 {
            return Err(EngineError::Config(
                "planner and worker timeouts must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Path of the SQLite database inside the data directory
    pub fn db_path(&self) -> PathBuf {
        self.core.data_dir.join("foreman.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let mut config = Config::default();
        assert!(config.validate_and_process().is_ok());
        assert_eq!(config.orchestrator.default_max_iterations, 10);
        assert_eq!(config.planner.timeout_secs, 30);
    }

    #[test]
    fn test_timing_ordering_enforced() {
        let mut config = Config::default();
        config.orchestrator.active_poll_secs = 60;
        config.orchestrator.cooldown_secs = 30;
        let err = config.validate_and_process().unwrap_err();
        assert!(err.to_string().contains("active_poll"));
    }

    #[test]
    fn test_zero_iteration_cap_rejected() {
        let mut config = Config::default();
        config.orchestrator.default_max_iterations = 0;
        assert!(config.validate_and_process().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [planner]
            model = "deepseek-reasoner"
            "#,
        )
        .unwrap();
        assert_eq!(config.planner.model, "deepseek-reasoner");
        assert_eq!(config.planner.base_url, "https://api.deepseek.com");
        assert_eq!(config.worker.fetch_retries, 2);
        assert_eq!(config.core.log_level, "info");
    }

    #[test]
    fn test_db_path_under_data_dir() {
        let mut config = Config::default();
        config.core.data_dir = PathBuf::from("/tmp/foreman-test");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/foreman-test/foreman.db"));
    }
}
