use crate::commands::check_profile;
use crate::error::Result;
use crate::output::{OutputFormat, OutputManager};
use crate::utils;
use clap::Args;
use hftmon_engine::collector::{SystemCollector, REPORT_FILE_NAME};
use hftmon_engine::config::EngineConfig;
use hftmon_engine::executor::CommandExecutor;
use hftmon_engine::interface::SystemProbe;
use hftmon_engine::sections::{SectionsCatalog, ALL_SECTIONS};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Only collect sections tagged with this profile
    #[arg(short, long, default_value = ALL_SECTIONS)]
    pub profile: String,

    /// Print the raw report instead of the summary
    #[arg(long)]
    pub full: bool,

    /// Save the raw report as system_info.txt
    #[arg(long)]
    pub save: bool,

    /// Directory for the saved report (default: paths.output_dir)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

pub async fn run(args: CollectArgs, config: EngineConfig, output: OutputManager) -> Result<()> {
    let catalog = SectionsCatalog::load(&config.paths.sections_file)?;
    check_profile(&catalog, &args.profile)?;

    let entries = catalog.filter_profile(&args.profile);
    let collector = SystemCollector::new(
        CommandExecutor::shell(config.collector.command_timeout()),
        Arc::new(SystemProbe::new()),
    );

    let spinner = output.create_spinner(&format!("Collecting {} rows...", entries.len()));
    let report = collector.collect_entries(&entries).await;
    spinner.finish_and_clear();

    if !report.interface_detected() {
        output.print_warning("No network interface detected (excluding lo)")?;
    }

    if !report.has_content() {
        output.print_warning("No commands to run for this profile")?;
        return Ok(());
    }

    output.print_collection(&report, args.full)?;

    if args.save {
        let dir = args.output_dir.unwrap_or(config.paths.output_dir);
        utils::check_directory_writable(&dir)?;
        let path = dir.join(REPORT_FILE_NAME);
        fs::write(&path, report.full_report())?;
        output.print_success(&format!("Report saved to {}", path.display()))?;
    }

    if output.format() == OutputFormat::Table {
        output.print_info(&format!(
            "{} commands succeeded, {} failed",
            report.succeeded(),
            report.failed()
        ))?;
    }

    Ok(())
}
