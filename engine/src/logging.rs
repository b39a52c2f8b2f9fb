//! Logging setup shared by the binaries

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{SettingsError, SettingsResult};

/// Parse a level name, falling back to `info`
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level
/// for the given crate targets. Logs go to stderr, plus a daily rotated file
/// when `file_path` is set; keep the returned guard alive to flush it.
pub fn init_logging(config: &LoggingConfig, targets: &[&str]) -> SettingsResult<Option<WorkerGuard>> {
    let level = parse_level(&config.level);

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let mut filter = EnvFilter::new("warn");
            for target in targets {
                let directive = format!("{}={}", target, level)
                    .parse()
                    .map_err(|_| SettingsError::InvalidValue {
                        field: "logging.level".to_string(),
                        value: config.level.clone(),
                    })?;
                filter = filter.add_directive(directive);
            }
            filter
        }
    };

    let (json_layer, plain_layer) = if config.json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_target(false).with_writer(std::io::stderr)))
    };

    let (file_layer, guard) = match &config.file_path {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "hftmon.log".into());

            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| SettingsError::ValidationFailed {
            reason: format!("Failed to initialize logging: {}", e),
        })?;

    Ok(guard)
}
