//! Braid Configuration Module
//!
//! Runtime defaults for the interpreter and the local substrate.
//! Config is stored in `~/.config/braid/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`BRAID_ENV_PREFIX`, `BRAID_MAX_HISTORY_LENGTH`, `BRAID_CALL_TIMEOUT_SECS`)
//! 2. Config file (`~/.config/braid/config.toml`)
//! 3. Defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BraidError, Result};
use crate::util::constants;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BraidConfig {
    #[serde(default)]
    pub runtime: RuntimeSettings,

    #[serde(default)]
    pub calls: CallSettings,
}

/// Interpreter settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeSettings {
    /// Prefix of environment variables loaded into `env` (prefix stripped)
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,

    /// Continue as new once history exceeds this many events (0 = never)
    #[serde(default)]
    pub max_history_length: usize,

    /// History length at which the substrate suggests continuing as new
    #[serde(default = "default_suggest_after")]
    pub suggest_continuation_after: usize,

    /// Validate inputs against declared schemas
    #[serde(default = "default_true")]
    pub validate_input: bool,
}

/// Call settings applied by the local substrate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallSettings {
    /// Timeout per call attempt when the task declares none
    #[serde(default = "default_call_timeout")]
    pub timeout_secs: u64,

    /// Attempts per call, first attempt included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_interval")]
    pub initial_interval_ms: u64,

    #[serde(default = "default_max_interval")]
    pub max_interval_ms: u64,

    #[serde(default = "default_backoff")]
    pub backoff_coefficient: f64,
}

fn default_env_prefix() -> String {
    constants::ENV_PREFIX.to_string()
}

fn default_suggest_after() -> usize {
    constants::SUGGEST_CONTINUATION_AFTER
}

fn default_true() -> bool {
    true
}

fn default_call_timeout() -> u64 {
    constants::CALL_TIMEOUT.as_secs()
}

fn default_max_attempts() -> u32 {
    constants::RETRY_MAX_ATTEMPTS
}

fn default_initial_interval() -> u64 {
    constants::RETRY_INITIAL_INTERVAL.as_millis() as u64
}

fn default_max_interval() -> u64 {
    constants::RETRY_MAX_INTERVAL.as_millis() as u64
}

fn default_backoff() -> f64 {
    constants::RETRY_BACKOFF
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            env_prefix: default_env_prefix(),
            max_history_length: 0,
            suggest_continuation_after: default_suggest_after(),
            validate_input: true,
        }
    }
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_call_timeout(),
            max_attempts: default_max_attempts(),
            initial_interval_ms: default_initial_interval(),
            max_interval_ms: default_max_interval(),
            backoff_coefficient: default_backoff(),
        }
    }
}

impl CallSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl BraidConfig {
    /// Get the config directory path
    ///
    /// Returns `~/.config/braid/` on Unix, `%APPDATA%/braid/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("braid")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from the default path
    ///
    /// Returns default config if file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file
    ///
    /// Returns error if the file exists but is malformed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| BraidError::ConfigError {
            reason: format!("Failed to read config file: {}", e),
        })?;

        toml::from_str(&content).map_err(|e| BraidError::ConfigError {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Merge with environment variables
    ///
    /// Environment variables take precedence over config file values.
    /// Unparseable numbers are ignored with a warning.
    pub fn with_env(mut self) -> Self {
        if let Ok(prefix) = std::env::var("BRAID_ENV_PREFIX") {
            if !prefix.is_empty() {
                self.runtime.env_prefix = prefix;
            }
        }

        if let Some(max) = parse_env::<usize>("BRAID_MAX_HISTORY_LENGTH") {
            self.runtime.max_history_length = max;
        }

        if let Some(secs) = parse_env::<u64>("BRAID_CALL_TIMEOUT_SECS") {
            self.calls.timeout_secs = secs;
        }

        self
    }

    /// Environment variables carrying the configured prefix
    ///
    /// `BRAID_REGION=eu` becomes `{"REGION": "eu"}`.
    pub fn load_env_map(&self) -> Map<String, Value> {
        env_map_with_prefix(&self.runtime.env_prefix, std::env::vars())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

fn env_map_with_prefix(
    prefix: &str,
    vars: impl Iterator<Item = (String, String)>,
) -> Map<String, Value> {
    let wanted = format!("{}_", prefix);
    vars.filter_map(|(key, value)| {
        key.strip_prefix(&wanted)
            .filter(|rest| !rest.is_empty())
            .map(|rest| (rest.to_string(), Value::String(value)))
    })
    .collect()
}
