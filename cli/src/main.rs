use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod output;
mod utils;

use commands::*;
use error::Result;
use hftmon_engine::config::EngineConfig;
use output::{OutputFormat, OutputManager};

#[derive(Parser)]
#[command(name = "hftctl")]
#[command(about = "hftctl - Diagnostics, threshold monitoring and tuning advice for HFT hosts")]
#[command(version)]
#[command(long_about = "
hftctl runs the diagnostic commands listed in the sections file, samples
numeric metrics against their thresholds, keeps a CSV history and asks a
local Ollama model for tuning recommendations.

Examples:
  hftctl collect --profile Network --save          # Run every Network command, save system_info.txt
  hftctl snapshot                                  # Sample every dynamic metric once
  hftctl monitor --interval 10 -m \"CPU Load\"       # Watch one metric every 10 seconds
  hftctl history \"CPU Load\" --range last-6h        # Stats for the last six hours
  hftctl analyze --profile Latency                 # Ask the model and write tune_system.sh
  hftctl config sections                           # List the sections catalog
")]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    format: OutputFormatArg,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, env = "HFTMON_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OutputFormatArg {
    Table,
    Json,
    Csv,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Table => OutputFormat::Table,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Csv => OutputFormat::Csv,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the diagnostic commands of the sections file
    Collect(CollectArgs),

    /// Sample dynamic metrics once
    Snapshot(SnapshotArgs),

    /// Monitor metrics against their thresholds
    Monitor(MonitorArgs),

    /// Query the monitoring history
    History(HistoryArgs),

    /// Ask the local LLM for a performance analysis
    Analyze(AnalyzeArgs),

    /// Chat with the local LLM about thresholds
    Chat(ChatArgs),

    /// Manage hftmon configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli);

    // Handle completion generation
    if let Commands::Completions { shell } = cli.command {
        generate_completions(shell);
        return;
    }

    // Run the command
    if let Err(e) = run_command(cli).await {
        let error_msg = error::format_error(&e);
        eprintln!("{}", error_msg);
        process::exit(e.exit_code());
    }
}

async fn run_command(cli: Cli) -> Result<()> {
    // Create output manager
    let colored = !cli.no_color && !cli.quiet && console::Term::stdout().features().colors_supported();
    let output = OutputManager::new(OutputFormat::from(cli.format), colored, cli.quiet);

    // Config handles its own loading so `config init` works without a file
    let (config_path, command) = (cli.config, cli.command);
    let load = || -> Result<EngineConfig> {
        let config = EngineConfig::load_with_fallback(config_path.as_ref())?;
        info!(
            sections = %config.paths.sections_file.display(),
            history = %config.paths.history_file.display(),
            "Loaded settings"
        );
        Ok(config)
    };

    // Route to appropriate command
    match command {
        Commands::Config(args) => commands::config::run(args, config_path.clone(), output).await,
        Commands::Collect(args) => commands::collect::run(args, load()?, output).await,
        Commands::Snapshot(args) => commands::snapshot::run(args, load()?, output).await,
        Commands::Monitor(args) => commands::monitor::run(args, load()?, output).await,
        Commands::History(args) => commands::history::run(args, load()?, output).await,
        Commands::Analyze(args) => commands::analyze::run(args, load()?, output).await,
        Commands::Chat(args) => commands::chat::run(args, load()?, output).await,
        // Completions are written before any command runs
        Commands::Completions { .. } => Ok(()),
    }
}

fn init_logging(cli: &Cli) {
    // Set log level based on CLI flags
    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else if cli.verbose {
        tracing::Level::INFO
    } else if cli.quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::WARN
    };

    // Logs go to stderr so they never mix with --format json/csv output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("hftctl={0},hftmon_engine={0}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("hftctl started");
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::{generate, Generator};
    use std::io;

    fn print_completions<G: Generator>(gen: G, cmd: &mut clap::Command) {
        generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
    }

    let mut cmd = Cli::command();
    eprintln!("Generating completion file for {shell}...");
    print_completions(shell, &mut cmd);
}
