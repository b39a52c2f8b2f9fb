use hftmon_engine::error::{AdvisorError, ArtifactError, ConfigError, EngineError, HistoryError, SettingsError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation cancelled by user")]
    Cancelled,
}

macro_rules! engine_error_from {
    ($($source:ty),*) => {
        $(
            impl From<$source> for CliError {
                fn from(error: $source) -> Self {
                    CliError::Engine(EngineError::from(error))
                }
            }
        )*
    };
}

engine_error_from!(ConfigError, SettingsError, HistoryError, AdvisorError, ArtifactError);

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(EngineError::Settings(_)) => 1,
            CliError::Io(_) => 2,
            CliError::Engine(EngineError::Config(_)) => 3,
            CliError::Engine(EngineError::History(HistoryError::NotFound { .. })) => 5,
            CliError::InvalidArgument(_) => 6,
            CliError::InvalidTimeRange(_) => 7,
            CliError::Engine(EngineError::Artifact(_)) => 8,
            CliError::Engine(EngineError::Advisor(_)) => 9,
            CliError::Cancelled => 130, // Standard Unix signal for SIGINT
            _ => 1,                     // Generic error
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Format error for user-friendly display
pub fn format_error(error: &CliError) -> String {
    match error {
        CliError::Engine(EngineError::Settings(e)) => {
            format!("Settings Error: {}\n\nTry running 'hftctl config show' to check your configuration.", e)
        }
        CliError::Engine(EngineError::Config(ConfigError::NotFound { path })) => {
            format!(
                "Sections File Not Found: {}\n\nSet paths.sections_file in the settings file or HFTMON_SECTIONS_FILE.",
                path
            )
        }
        CliError::Engine(EngineError::Config(e)) => {
            format!("Sections Error: {}\n\nRun 'hftctl config sections' after fixing the sections file.", e)
        }
        CliError::Engine(EngineError::History(HistoryError::NotFound { path })) => {
            format!(
                "No History: {}\n\nRun 'hftctl monitor' to start recording samples.",
                path
            )
        }
        CliError::Engine(EngineError::Advisor(e)) => {
            format!("Ollama Error: {}\n\nEnsure `ollama serve` is running and the model is pulled.", e)
        }
        CliError::InvalidTimeRange(msg) => {
            format!(
                "Invalid Time Range: {}\n\nSupported formats: 'last-6h', 'last-day', 'today', '2024-01-01 09:00..2024-01-01 17:00'.",
                msg
            )
        }
        CliError::Cancelled => "Operation cancelled by user.".to_string(),
        _ => error.to_string(),
    }
}
