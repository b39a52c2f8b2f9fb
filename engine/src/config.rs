//! Configuration management for the hftmon engine
//!
//! This module handles loading, parsing, and validating engine settings
//! from a TOML file and environment variables. The metric definitions
//! themselves live in the sections table, see [`crate::sections`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SettingsError, SettingsResult};
use crate::scheduler::UpdateInterval;

/// Main configuration structure for the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// File locations
    pub paths: PathsConfig,

    /// Monitoring loop configuration
    pub monitor: MonitorConfig,

    /// System information collector configuration
    pub collector: CollectorConfig,

    /// LLM advisor configuration
    pub advisor: AdvisorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// File locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Sections table (CSV) holding the command catalog
    pub sections_file: PathBuf,

    /// Append-only monitoring history log
    pub history_file: PathBuf,

    /// Directory for generated reports and tuning scripts
    pub output_dir: PathBuf,
}

/// Monitoring loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between ticks (10, 30, 60 or 300)
    pub interval_secs: u64,

    /// Samples kept in memory per metric
    pub buffer_capacity: usize,

    /// Hard timeout for a single metric command
    pub command_timeout_secs: u64,
}

/// System information collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Hard timeout for a single diagnostic command
    pub command_timeout_secs: u64,
}

/// LLM advisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Ollama base URL
    pub base_url: String,

    /// Model name
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Sampling temperature
    pub temperature: Option<f32>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,

    /// Emit JSON lines instead of human readable output
    pub json: bool,

    /// Optional log file (daily rotation)
    pub file_path: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sections_file: PathBuf::from("sections_config.csv"),
            history_file: PathBuf::from("monitoring_history.csv"),
            output_dir: PathBuf::from("."),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            buffer_capacity: crate::monitor::DEFAULT_BUFFER_CAPACITY,
            command_timeout_secs: 30,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 60,
        }
    }
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            timeout_secs: 120,
            temperature: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_path: None,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> SettingsResult<UpdateInterval> {
        UpdateInterval::from_secs(self.interval_secs).ok_or_else(|| SettingsError::InvalidValue {
            field: "monitor.interval_secs".to_string(),
            value: self.interval_secs.to_string(),
        })
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl CollectorConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SettingsResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|_| SettingsError::FileNotFound { path: path.to_string_lossy().to_string() })?;

        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| SettingsError::ParseError { reason: e.to_string() })?;

        config.validate()?;
        Ok(config)
    }

    /// Override fields from `HFTMON_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(sections_file) = std::env::var("HFTMON_SECTIONS_FILE") {
            self.paths.sections_file = PathBuf::from(sections_file);
        }

        if let Ok(history_file) = std::env::var("HFTMON_HISTORY_FILE") {
            self.paths.history_file = PathBuf::from(history_file);
        }

        if let Ok(base_url) = std::env::var("HFTMON_OLLAMA_URL") {
            self.advisor.base_url = base_url;
        }

        if let Ok(model) = std::env::var("HFTMON_MODEL") {
            self.advisor.model = model;
        }

        if let Ok(log_level) = std::env::var("HFTMON_LOG_LEVEL") {
            self.logging.level = log_level;
        }
    }

    /// Load configuration with fallback order: defaults -> file -> env
    pub fn load_with_fallback<P: AsRef<Path>>(config_path: Option<P>) -> SettingsResult<Self> {
        let mut config = EngineConfig::default();

        match config_path {
            Some(path) => {
                // An explicit path must exist
                config = EngineConfig::from_file(path)?;
            }
            None => {
                if let Ok(default_path) = EngineConfig::default_config_path() {
                    if default_path.exists() {
                        config = EngineConfig::from_file(&default_path)?;
                        tracing::debug!("Loaded settings from {}", default_path.display());
                    }
                }
            }
        }

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> SettingsResult<()> {
        self.monitor.interval()?;

        if self.monitor.buffer_capacity == 0 {
            return Err(SettingsError::InvalidValue {
                field: "monitor.buffer_capacity".to_string(),
                value: "0".to_string(),
            });
        }

        if self.monitor.command_timeout_secs == 0 {
            return Err(SettingsError::InvalidValue {
                field: "monitor.command_timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }

        if self.collector.command_timeout_secs == 0 {
            return Err(SettingsError::InvalidValue {
                field: "collector.command_timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }

        if !self.advisor.base_url.starts_with("http://") && !self.advisor.base_url.starts_with("https://") {
            return Err(SettingsError::InvalidValue {
                field: "advisor.base_url".to_string(),
                value: self.advisor.base_url.clone(),
            });
        }

        if self.advisor.model.trim().is_empty() {
            return Err(SettingsError::ValidationFailed {
                reason: "advisor.model must not be empty".to_string(),
            });
        }

        if let Some(temperature) = self.advisor.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(SettingsError::InvalidValue {
                    field: "advisor.temperature".to_string(),
                    value: temperature.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("hftmon").join("hftmon.toml"))
            .ok_or_else(|| SettingsError::ValidationFailed {
                reason: "Unable to determine config directory".to_string(),
            })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> SettingsResult<()> {
        let path = path.as_ref();

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|_| SettingsError::ValidationFailed {
                    reason: format!("Unable to create config directory: {}", parent.display()),
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SettingsError::ValidationFailed { reason: e.to_string() })?;

        fs::write(path, content)
            .map_err(|_| SettingsError::PermissionDenied { path: path.to_string_lossy().to_string() })?;

        Ok(())
    }
}
