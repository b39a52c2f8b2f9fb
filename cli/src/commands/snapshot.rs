use crate::commands::resolve_metrics;
use crate::error::{CliError, Result};
use crate::output::OutputManager;
use clap::Args;
use hftmon_engine::config::EngineConfig;
use hftmon_engine::executor::CommandExecutor;
use hftmon_engine::interface::SystemProbe;
use hftmon_engine::sampler::Sampler;
use hftmon_engine::sections::SectionsCatalog;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Metrics to sample (default: every dynamic metric)
    #[arg(short, long = "metric")]
    pub metrics: Vec<String>,
}

pub async fn run(args: SnapshotArgs, config: EngineConfig, output: OutputManager) -> Result<()> {
    let catalog = SectionsCatalog::load(&config.paths.sections_file)?;
    let metrics = resolve_metrics(&catalog, &args.metrics)?;
    if metrics.is_empty() {
        return Err(CliError::InvalidArgument(
            "No dynamic_single metrics defined in the sections file".to_string(),
        ));
    }

    let sampler = Sampler::new(
        CommandExecutor::shell(config.monitor.command_timeout()),
        Arc::new(SystemProbe::new()),
    );

    let spinner = output.create_spinner("Sampling metrics...");
    let snapshot = sampler.sample(&metrics).await;
    spinner.finish_and_clear();

    output.print_snapshot(&snapshot, &metrics)
}
