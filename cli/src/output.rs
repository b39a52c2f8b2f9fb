use crate::error::Result;
use crate::utils::{format_timestamp, truncate_string};
use console::style;
use hftmon_engine::advisor::{AnalysisResult, Recommendation, Risk};
use hftmon_engine::collector::CollectionReport;
use hftmon_engine::history::{HistoryView, TIMESTAMP_FORMAT};
use hftmon_engine::monitor::TickReport;
use hftmon_engine::sampler::{SampleValue, Snapshot};
use hftmon_engine::sections::{MetricDefinition, Section};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "table" => Ok(OutputFormat::Table),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// One metric value row shared by snapshot and monitor output
#[derive(Debug, Clone, Serialize)]
struct MetricRow {
    metric: String,
    value: String,
    unit: String,
    min: Option<f64>,
    max: Option<f64>,
    breaching: bool,
}

#[derive(Debug, Serialize)]
struct HistoryRow {
    timestamp: String,
    metric: String,
    value: Option<f64>,
}

#[derive(Debug, Serialize)]
struct SectionRow<'a> {
    section: &'a str,
    name: &'a str,
    kind: &'a str,
    command: &'a str,
    min: Option<f64>,
    max: Option<f64>,
    unit: &'a str,
    profile: &'a str,
}

#[derive(Debug, Serialize)]
struct SectionJson<'a> {
    section: &'a str,
    entries: &'a [&'a MetricDefinition],
}

pub struct OutputManager {
    format: OutputFormat,
    colored: bool,
    quiet: bool,
}

impl OutputManager {
    pub fn new(format: OutputFormat, colored: bool, quiet: bool) -> Self {
        Self {
            format,
            colored,
            quiet,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn print_csv<T: Serialize>(&self, rows: impl IntoIterator<Item = T>) -> Result<()> {
        let mut writer = csv::Writer::from_writer(io::stdout());
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn heading(&self, title: &str) {
        if self.colored {
            println!("{}", style(title).bold().underlined());
        } else {
            println!("{}", title);
        }
    }

    pub fn print_snapshot(&self, snapshot: &Snapshot, metrics: &[&MetricDefinition]) -> Result<()> {
        let rows: Vec<MetricRow> = snapshot
            .values
            .iter()
            .map(|(name, value)| {
                let definition = metrics.iter().find(|m| &m.name == name);
                MetricRow {
                    metric: name.clone(),
                    value: value.to_string(),
                    unit: definition.map(|m| m.unit.clone()).unwrap_or_default(),
                    min: definition.and_then(|m| m.min),
                    max: definition.and_then(|m| m.max),
                    breaching: match (value, definition) {
                        (SampleValue::Number(v), Some(m)) => m.is_breach(*v),
                        _ => false,
                    },
                }
            })
            .collect();

        match self.format {
            OutputFormat::Json => self.print_json(snapshot),
            OutputFormat::Csv => self.print_csv(rows),
            OutputFormat::Table => {
                self.heading(&format!("Snapshot (interface: {})", snapshot.interface));
                self.print_metric_table(&rows);
                Ok(())
            }
        }
    }

    pub fn print_tick(&self, report: &TickReport) -> Result<()> {
        let rows: Vec<MetricRow> = report
            .readings
            .iter()
            .map(|reading| MetricRow {
                metric: reading.metric.clone(),
                value: reading.raw.to_string(),
                unit: reading.unit.clone(),
                min: reading.min,
                max: reading.max,
                breaching: reading.breaching,
            })
            .collect();

        match self.format {
            OutputFormat::Json => {
                // One object per line so the stream can be piped
                println!("{}", serde_json::to_string(report)?);
            }
            OutputFormat::Csv => {
                // Header comes from print_tick_header, once per stream
                let timestamp = report.timestamp.format(TIMESTAMP_FORMAT).to_string();
                let mut writer = csv::WriterBuilder::new()
                    .has_headers(false)
                    .from_writer(io::stdout());
                for reading in &report.readings {
                    writer.serialize(HistoryRow {
                        timestamp: timestamp.clone(),
                        metric: reading.metric.clone(),
                        value: reading.value,
                    })?;
                }
                writer.flush()?;
            }
            OutputFormat::Table => {
                println!();
                self.heading(&format!("Tick {}", format_timestamp(&report.timestamp)));
                self.print_metric_table(&rows);
                for series in &report.series {
                    let values: Vec<f64> = series.points.iter().filter_map(|p| p.value).collect();
                    if values.len() > 1 {
                        println!("  {:<30} {}", truncate_string(&series.metric, 30), sparkline(&values, 40));
                    }
                }
                for breach in &report.breaches {
                    let line = format!(
                        "{} = {} (since {})",
                        breach.metric,
                        breach.value,
                        breach.since.format("%H:%M:%S")
                    );
                    self.print_alert(&line);
                }
                for message in &report.log_errors {
                    self.print_warning(&format!("Could not write history: {}", message))?;
                }
            }
        }
        Ok(())
    }

    pub fn print_tick_header(&self) {
        if self.format == OutputFormat::Csv {
            println!("timestamp,metric,value");
        }
    }

    fn print_metric_table(&self, rows: &[MetricRow]) {
        if rows.is_empty() {
            println!("No metrics selected");
            return;
        }

        println!("{:<32} {:>16} {:<8} {}", "Metric", "Value", "Unit", "Thresholds");
        println!("{:-<32} {:->16} {:-<8} {:-<24}", "", "", "", "");

        for row in rows {
            let thresholds = format!(
                "{} .. {}",
                row.min.map_or_else(|| "—".to_string(), |v| v.to_string()),
                row.max.map_or_else(|| "—".to_string(), |v| v.to_string())
            );
            let value = truncate_string(&row.value, 16);
            let metric = truncate_string(&row.metric, 32);

            if self.colored {
                let value = if row.breaching {
                    style(format!("{:>16}", value)).red().bold()
                } else {
                    style(format!("{:>16}", value)).green()
                };
                println!("{:<32} {} {:<8} {}", style(&metric).cyan(), value, row.unit, style(thresholds).dim());
            } else {
                let marker = if row.breaching { " !" } else { "" };
                println!("{:<32} {:>16} {:<8} {}{}", metric, value, row.unit, thresholds, marker);
            }
        }
    }

    pub fn print_history(&self, view: &HistoryView, limit: usize) -> Result<()> {
        match self.format {
            OutputFormat::Json => return self.print_json(view),
            OutputFormat::Csv => {
                return self.print_csv(view.points.iter().map(|p| HistoryRow {
                    timestamp: p.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    metric: view.metric.clone(),
                    value: p.value,
                }));
            }
            OutputFormat::Table => {}
        }

        self.heading(&format!("History: {}", view.metric));

        if view.is_empty() {
            println!("No data for this metric");
            return Ok(());
        }

        if view.degenerate {
            self.print_info("Not enough distinct timestamps for a range, showing all points")?;
        } else if let (Some(span), Some(range)) = (view.span, view.range) {
            println!("Available: {} .. {}", format_timestamp(&span.start), format_timestamp(&span.end));
            println!("Showing:   {} .. {}", format_timestamp(&range.start), format_timestamp(&range.end));
        }

        match &view.stats {
            Some(stats) => {
                let std_dev = stats
                    .std_dev
                    .map_or_else(|| "—".to_string(), |v| format!("{:.2}", v));
                println!(
                    "Points: {}  Min: {:.2}  Max: {:.2}  Mean: {:.2}  Std: {}",
                    stats.count, stats.min, stats.max, stats.mean, std_dev
                );
            }
            None => println!("Points: 0 numeric values in range"),
        }
        println!();

        let skipped = view.points.len().saturating_sub(limit);
        if skipped > 0 {
            println!("... {} earlier points omitted", skipped);
        }
        println!("{:<26} {:>16}", "Timestamp", "Value");
        println!("{:-<26} {:->16}", "", "");
        for point in view.points.iter().skip(skipped) {
            let value = point.value.map_or_else(|| "—".to_string(), |v| v.to_string());
            println!("{:<26} {:>16}", format_timestamp(&point.timestamp), value);
        }
        Ok(())
    }

    pub fn print_metric_names(&self, names: &[String]) -> Result<()> {
        match self.format {
            OutputFormat::Json => self.print_json(names),
            OutputFormat::Csv => {
                println!("metric");
                for name in names {
                    println!("{}", name);
                }
                Ok(())
            }
            OutputFormat::Table => {
                self.heading("Recorded metrics");
                for name in names {
                    println!("  {}", name);
                }
                Ok(())
            }
        }
    }

    pub fn print_collection(&self, report: &CollectionReport, full: bool) -> Result<()> {
        match self.format {
            OutputFormat::Json => self.print_json(report),
            OutputFormat::Csv => {
                let mut writer = csv::Writer::from_writer(io::stdout());
                writer.write_record(["section", "name", "command", "status", "reason"])?;
                for (section, entry) in report.executed() {
                    let status = if entry.succeeded() { "success" } else { "failed" };
                    let reason = entry.outcome.as_ref().map(|o| o.reason_text()).unwrap_or_default();
                    writer.write_record([section, entry.name.as_str(), entry.command.as_str(), status, reason.as_str()])?;
                }
                writer.flush()?;
                Ok(())
            }
            OutputFormat::Table => {
                if full {
                    println!("{}", report.full_report());
                } else {
                    println!("{}", report.summary_markdown());
                }
                Ok(())
            }
        }
    }

    pub fn print_sections(&self, sections: &[Section<'_>]) -> Result<()> {
        let rows = sections.iter().flat_map(|section| {
            section.entries.iter().map(move |entry| SectionRow {
                section: section.title,
                name: &entry.name,
                kind: entry.kind.as_str(),
                command: &entry.command,
                min: entry.min,
                max: entry.max,
                unit: &entry.unit,
                profile: &entry.profile,
            })
        });

        match self.format {
            OutputFormat::Json => {
                let grouped: Vec<SectionJson<'_>> = sections
                    .iter()
                    .map(|s| SectionJson {
                        section: s.title,
                        entries: &s.entries,
                    })
                    .collect();
                self.print_json(&grouped)
            }
            OutputFormat::Csv => self.print_csv(rows),
            OutputFormat::Table => {
                for section in sections {
                    println!();
                    self.heading(section.title);
                    for entry in &section.entries {
                        let tag = if entry.is_dynamic() {
                            format!("  [{}]", entry.threshold_display())
                        } else {
                            String::new()
                        };
                        if self.colored {
                            println!("  {} {}{}", style(&entry.name).bold(), style(&entry.command).dim(), tag);
                        } else {
                            println!("  {} {}{}", entry.name, entry.command, tag);
                        }
                    }
                }
                Ok(())
            }
        }
    }

    pub fn print_analysis(&self, result: &AnalysisResult) -> Result<()> {
        match self.format {
            OutputFormat::Json => self.print_json(result),
            OutputFormat::Csv => {
                let mut writer = csv::Writer::from_writer(io::stdout());
                writer.write_record(["id", "title", "risk", "impact", "commands"])?;
                for rec in &result.recommendations {
                    writer.write_record([
                        rec.id.as_str(),
                        rec.title.as_str(),
                        &rec.risk.to_string(),
                        rec.impact.as_str(),
                        rec.commands.join("; ").as_str(),
                    ])?;
                }
                writer.flush()?;
                Ok(())
            }
            OutputFormat::Table => {
                self.heading(&format!("Performance Analysis: {}", result.profile));
                println!("{}\n", result.analysis);
                if result.recommendations.is_empty() {
                    return Ok(());
                }
                self.heading("Recommendations");
                for rec in &result.recommendations {
                    self.print_recommendation(rec);
                }
                Ok(())
            }
        }
    }

    fn print_recommendation(&self, rec: &Recommendation) {
        let risk = rec.risk.to_string();
        if self.colored {
            let risk = match rec.risk {
                Risk::Low => style(risk).green(),
                Risk::Medium => style(risk).yellow(),
                Risk::High => style(risk).red().bold(),
            };
            println!("\n[{}] {} ({} risk)", style(&rec.id).cyan(), style(&rec.title).bold(), risk);
        } else {
            println!("\n[{}] {} ({} risk)", rec.id, rec.title, risk);
        }
        println!("  {}", rec.description);
        if !rec.impact.is_empty() {
            println!("  Impact: {}", rec.impact);
        }
        if !rec.why_hft.is_empty() {
            println!("  Why HFT: {}", rec.why_hft);
        }
        for command in &rec.commands {
            println!("    $ {}", command);
        }
    }

    pub fn print_key_value(&self, key: &str, value: &str) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let mut map = BTreeMap::new();
                map.insert(key, value);
                self.print_json(&map)?;
            }
            OutputFormat::Table => {
                if self.colored {
                    println!("{}: {}", style(key).bold().blue(), style(value).green());
                } else {
                    println!("{}: {}", key, value);
                }
            }
            OutputFormat::Csv => {
                println!("{},{}", key, value);
            }
        }
        Ok(())
    }

    pub fn print_success(&self, message: &str) -> Result<()> {
        if self.quiet {
            return Ok(());
        }
        if self.colored {
            println!("{} {}", style("✓").green().bold(), message);
        } else {
            println!("✓ {}", message);
        }
        Ok(())
    }

    pub fn print_warning(&self, message: &str) -> Result<()> {
        if self.colored {
            eprintln!("{} {}", style("⚠").yellow().bold(), message);
        } else {
            eprintln!("⚠ {}", message);
        }
        Ok(())
    }

    pub fn print_info(&self, message: &str) -> Result<()> {
        if self.quiet {
            return Ok(());
        }
        if self.colored {
            println!("{} {}", style("ℹ").blue().bold(), message);
        } else {
            println!("ℹ {}", message);
        }
        Ok(())
    }

    fn print_alert(&self, message: &str) {
        if self.colored {
            println!("{} {}", style("🚨 ALERT").red().bold(), style(message).red());
        } else {
            println!("ALERT {}", message);
        }
    }

    pub fn create_spinner(&self, message: &str) -> ProgressBar {
        if self.quiet || self.format != OutputFormat::Table {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.green} {msg}")
        {
            pb.set_style(spinner_style);
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message(message.to_string());
        pb
    }

    pub fn prompt_confirm(&self, message: &str) -> Result<bool> {
        print!("{} [y/N]: ", message);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        let answer = input.trim().to_lowercase();
        Ok(answer == "y" || answer == "yes")
    }

    /// Read one line; `None` on end of input
    pub fn prompt_input(&self, message: &str) -> Result<Option<String>> {
        if self.colored {
            print!("{} ", style(message).bold());
        } else {
            print!("{} ", message);
        }
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        Ok(Some(input.trim().to_string()))
    }
}

/// Block-character chart of the last `width` values
fn sparkline(values: &[f64], width: usize) -> String {
    const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

    let tail = &values[values.len().saturating_sub(width)..];
    let min = tail.iter().copied().fold(f64::INFINITY, f64::min);
    let max = tail.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    tail.iter()
        .map(|v| {
            if span <= f64::EPSILON {
                BARS[0]
            } else {
                let index = ((v - min) / span * (BARS.len() - 1) as f64).round() as usize;
                BARS[index.min(BARS.len() - 1)]
            }
        })
        .collect()
}
