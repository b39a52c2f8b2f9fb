use crate::error::Result;
use crate::output::OutputManager;
use crate::utils::parse_time_range;
use chrono::Local;
use clap::Args;
use hftmon_engine::config::EngineConfig;
use hftmon_engine::history::HistoryStore;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Metric to show; lists recorded metrics when omitted
    pub metric: Option<String>,

    /// Time window, e.g. 'last-6h', 'today' or '2024-01-01 09:00..2024-01-01 17:00'
    /// (default: the last 24 hours of recorded data)
    #[arg(short, long)]
    pub range: Option<String>,

    /// Maximum number of points to print in table format
    #[arg(short, long, default_value = "50")]
    pub limit: usize,

    /// History file (default: paths.history_file)
    #[arg(long)]
    pub file: Option<PathBuf>,
}

pub async fn run(args: HistoryArgs, config: EngineConfig, output: OutputManager) -> Result<()> {
    let path = args.file.unwrap_or(config.paths.history_file);
    let store = HistoryStore::load(&path)?;

    let Some(metric) = args.metric else {
        let metrics = store.metrics();
        if metrics.is_empty() {
            output.print_warning(&format!("No samples recorded in {}", path.display()))?;
            return Ok(());
        }
        return output.print_metric_names(&metrics);
    };

    let range = args
        .range
        .as_deref()
        .map(|raw| parse_time_range(raw, Local::now().naive_local()))
        .transpose()?;

    let view = store.query(&metric, range);
    if view.total_points == 0 {
        output.print_warning(&format!("No data for metric '{}'", metric))?;
    }
    output.print_history(&view, args.limit)
}
