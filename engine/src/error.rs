//! Error handling for the hftmon engine
//!
//! This module provides the error taxonomy for every engine component:
//! the sections loader, the settings file, the history log, the LLM advisor
//! and the generated tuning artifacts. Command execution and output parsing
//! failures are not errors here; they are recovered where they happen and
//! encoded in the returned values.

use std::io;

use thiserror::Error;

/// The main error type for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Sections (metric definition) loading errors
    #[error("Sections configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Engine settings errors
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// History log errors
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// LLM collaborator errors
    #[error("Advisor error: {0}")]
    Advisor(#[from] AdvisorError),

    /// Tuning artifact errors
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Scheduling errors
    #[error("Scheduling error: {0}")]
    Scheduling(String),
}

/// Errors raised while loading the sections table
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Sections file not found: {path}")]
    NotFound { path: String },

    #[error("Sections file {path} has no rows")]
    Empty { path: String },

    #[error("Missing required columns: {}. Found: {}", .missing.join(", "), .found.join(", "))]
    MissingColumns { missing: Vec<String>, found: Vec<String> },

    #[error("Invalid thresholds for {metric}: min {min} is greater than max {max}")]
    InvalidThresholds { metric: String, min: f64, max: f64 },

    #[error("Duplicate dynamic metric name: {metric}")]
    DuplicateMetric { metric: String },

    #[error("Unknown metric: {metric}")]
    UnknownMetric { metric: String },

    #[error("Sections parsing error at line {line}: {reason}")]
    Parse { line: u64, reason: String },
}

/// Errors raised by the engine settings file
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings file not found: {path}")]
    FileNotFound { path: String },

    #[error("Settings parsing error: {reason}")]
    ParseError { reason: String },

    #[error("Invalid settings value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("Settings validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Settings file permission denied: {path}")]
    PermissionDenied { path: String },
}

/// History log errors
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("History file not found: {path}")]
    NotFound { path: String },

    #[error("History I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("History CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// LLM collaborator errors
#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("LLM service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode LLM response: {reason}")]
    Decode { reason: String },
}

/// Tuning artifact errors
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Select at least one recommendation")]
    NothingSelected,

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, EngineError>;

/// A specialized result type for sections loading
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A specialized result type for settings operations
pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

/// A specialized result type for history operations
pub type HistoryResult<T> = std::result::Result<T, HistoryError>;

/// A specialized result type for advisor operations
pub type AdvisorResult<T> = std::result::Result<T, AdvisorError>;

impl EngineError {
    /// Check if the calling flow can carry on after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Config(_) => false,
            EngineError::Settings(_) => false,
            EngineError::History(HistoryError::NotFound { .. }) => true,
            EngineError::History(_) => true,
            EngineError::Advisor(_) => true,
            EngineError::Artifact(ArtifactError::NothingSelected) => true,
            EngineError::Artifact(_) => false,
            EngineError::Io(io_error) => {
                matches!(io_error.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
            }
            EngineError::Scheduling(_) => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Config(_) => "config",
            EngineError::Settings(_) => "settings",
            EngineError::History(_) => "history",
            EngineError::Advisor(_) => "advisor",
            EngineError::Artifact(_) => "artifact",
            EngineError::Io(_) => "io",
            EngineError::Scheduling(_) => "scheduling",
        }
    }
}
