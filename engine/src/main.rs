//! hftmon monitoring daemon entry point
//!
//! Runs the threshold monitoring loop headless, logging samples and
//! breaches through tracing.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use hftmon_engine::{
    config::EngineConfig,
    error::Result,
    logging::init_logging,
    scheduler::UpdateInterval,
    sections::SectionsCatalog,
    service::MonitorService,
};

/// hftmon monitoring daemon command line interface
#[derive(Parser)]
#[command(name = "hftmond")]
#[command(about = "Headless threshold monitoring for HFT hosts")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "HFTMON_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Also log to this file (rotated daily)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring loop
    Run {
        /// Metrics to monitor (default: every dynamic metric)
        #[arg(short, long = "metric")]
        metrics: Vec<String>,

        /// Update interval in seconds (10, 30, 60 or 300)
        #[arg(short, long)]
        interval: Option<UpdateInterval>,

        /// Stop after this many ticks
        #[arg(long)]
        max_ticks: Option<u64>,
    },

    /// Validate settings and the sections file
    Validate,

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match EngineConfig::load_with_fallback(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    if let Some(path) = &cli.log_file {
        config.logging.file_path = Some(path.clone());
    }

    // Initialize logging
    let _guard = match init_logging(&config.logging, &["hftmon_engine", "hftmond"]) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Some(Commands::Run {
            metrics,
            interval,
            max_ticks,
        }) => run_monitor(config, metrics, interval, max_ticks).await,
        Some(Commands::Validate) => validate(&config),
        Some(Commands::Config { show }) => handle_config(&config, show),
        None => run_monitor(config, Vec::new(), None, None).await, // Default to run
    };

    match result {
        Ok(_) => {
            info!("Command completed successfully");
        }
        Err(e) => {
            error!(category = e.category(), "Command failed: {}", e);
            process::exit(1);
        }
    }
}

/// Run the monitoring loop until a signal arrives
async fn run_monitor(
    mut config: EngineConfig,
    metrics: Vec<String>,
    interval: Option<UpdateInterval>,
    max_ticks: Option<u64>,
) -> Result<()> {
    if let Some(interval) = interval {
        config.monitor.interval_secs = interval.as_secs();
    }

    info!(
        sections = %config.paths.sections_file.display(),
        history = %config.paths.history_file.display(),
        interval_secs = config.monitor.interval_secs,
        "Starting hftmon monitoring daemon"
    );

    let selected = (!metrics.is_empty()).then_some(metrics);
    let service = MonitorService::new(&config, selected.as_deref())?;
    let stats = service.run(max_ticks).await?;

    info!(
        ticks = stats.ticks,
        breaching_ticks = stats.breaching_ticks,
        log_errors = stats.log_errors,
        "Monitoring daemon stopped"
    );
    Ok(())
}

/// Validate settings and the sections catalog
fn validate(config: &EngineConfig) -> Result<()> {
    config.validate()?;
    let catalog = SectionsCatalog::load(&config.paths.sections_file)?;

    println!("Configuration is valid");
    println!(
        "Sections file: {} ({} rows, {} dynamic metrics)",
        config.paths.sections_file.display(),
        catalog.entries().len(),
        catalog.dynamic_metrics().len()
    );
    Ok(())
}

/// Handle configuration commands
fn handle_config(config: &EngineConfig, show: bool) -> Result<()> {
    if show {
        let rendered = toml::to_string_pretty(config).map_err(|e| {
            hftmon_engine::SettingsError::ValidationFailed { reason: e.to_string() }
        })?;
        println!("Effective configuration:");
        println!("{}", rendered);
    } else {
        config.validate()?;
        println!("Configuration is valid");
    }

    Ok(())
}
