use crate::commands::check_profile;
use crate::error::{CliError, Result};
use crate::output::{OutputFormat, OutputManager};
use crate::utils;
use clap::Args;
use hftmon_engine::advisor::{Advisor, AnalysisContext, OllamaBackend, Recommendation};
use hftmon_engine::artifacts::{default_selection, select_by_ids, write_artifacts};
use hftmon_engine::collector::SystemCollector;
use hftmon_engine::config::EngineConfig;
use hftmon_engine::executor::CommandExecutor;
use hftmon_engine::interface::{InterfaceProbe, SystemProbe};
use hftmon_engine::sampler::{Sampler, Snapshot};
use hftmon_engine::sections::{MetricDefinition, SectionsCatalog, ALL_SECTIONS};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Profile to analyze
    #[arg(short, long, default_value = ALL_SECTIONS)]
    pub profile: String,

    /// Skip running the profile's commands; the model only sees the command list
    #[arg(long)]
    pub no_collect: bool,

    /// Recommendation ids to include in the tuning script
    #[arg(short, long = "select")]
    pub selected: Vec<String>,

    /// Include every recommendation, high risk ones too
    #[arg(long, conflicts_with = "selected")]
    pub all: bool,

    /// Do not write tune_system.sh and performance_report.md
    #[arg(long)]
    pub no_artifacts: bool,

    /// Write artifacts without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Directory for the artifacts (default: paths.output_dir)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

pub async fn run(args: AnalyzeArgs, config: EngineConfig, output: OutputManager) -> Result<()> {
    let catalog = SectionsCatalog::load(&config.paths.sections_file)?;
    check_profile(&catalog, &args.profile)?;

    let probe: Arc<dyn InterfaceProbe> = Arc::new(SystemProbe::new());
    let interface = probe.primary_interface();
    let entries = catalog.filter_profile(&args.profile);

    let report = if args.no_collect {
        None
    } else {
        let collector = SystemCollector::new(
            CommandExecutor::shell(config.collector.command_timeout()),
            probe.clone(),
        );
        let spinner = output.create_spinner(&format!("Collecting {} rows...", entries.len()));
        let report = collector.collect_entries(&entries).await;
        spinner.finish_and_clear();
        Some(report)
    };

    let dynamic: Vec<&MetricDefinition> = entries.iter().copied().filter(|e| e.is_dynamic()).collect();
    let snapshot = if dynamic.is_empty() {
        Snapshot::default()
    } else {
        let sampler = Sampler::new(CommandExecutor::shell(config.monitor.command_timeout()), probe.clone());
        sampler.sample(&dynamic).await
    };

    let context = AnalysisContext::new(&args.profile, &catalog, report.as_ref(), &snapshot, &interface);
    let advisor = Advisor::new(Arc::new(OllamaBackend::new(&config.advisor)?));

    let spinner = output.create_spinner(&format!("Asking {} for an analysis...", config.advisor.model));
    let result = advisor.analyze(context).await;
    spinner.finish_and_clear();

    output.print_analysis(&result)?;

    if let Some(error) = &result.error {
        output.print_warning(&format!("Analysis unavailable: {}", error))?;
        return Ok(());
    }
    if result.recommendations.is_empty() || args.no_artifacts {
        return Ok(());
    }

    let selected = pick_recommendations(&result.recommendations, &args)?;
    if selected.is_empty() {
        output.print_info("No recommendations selected, skipping the tuning script")?;
        return Ok(());
    }

    let dir = args.output_dir.unwrap_or(config.paths.output_dir);
    if !args.yes && output.format() == OutputFormat::Table {
        let question = format!(
            "Write a tuning script with {} recommendations to {}?",
            selected.len(),
            dir.display()
        );
        if !output.prompt_confirm(&question)? {
            output.print_info("Artifacts not written")?;
            return Ok(());
        }
    }

    utils::check_directory_writable(&dir)?;
    let written = write_artifacts(&dir, &result.profile, &result.analysis, &selected, result.generated_at)?;
    output.print_success(&format!("Tuning script written to {}", written.script.display()))?;
    output.print_success(&format!("Report written to {}", written.report.display()))?;
    output.print_info("Review the script before running it with sudo")?;
    Ok(())
}

/// Explicit ids win, then `--all`, else everything but high risk
fn pick_recommendations<'a>(
    recommendations: &'a [Recommendation],
    args: &AnalyzeArgs,
) -> Result<Vec<&'a Recommendation>> {
    if !args.selected.is_empty() {
        let unknown: Vec<&str> = args
            .selected
            .iter()
            .filter(|id| !recommendations.iter().any(|r| &r.id == *id))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(CliError::InvalidArgument(format!(
                "Unknown recommendation ids: {}",
                unknown.join(", ")
            )));
        }
        return Ok(select_by_ids(recommendations, &args.selected));
    }

    if args.all {
        return Ok(recommendations.iter().collect());
    }

    Ok(default_selection(recommendations))
}
