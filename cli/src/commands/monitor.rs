use crate::error::{CliError, Result};
use crate::output::{OutputFormat, OutputManager};
use clap::Args;
use hftmon_engine::config::EngineConfig;
use hftmon_engine::error::EngineError;
use hftmon_engine::interface::SystemProbe;
use hftmon_engine::scheduler::{MonitorHandle, MonitorScheduler, UpdateInterval};
use hftmon_engine::service::{build_monitor, load_catalog};
use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Metrics to monitor (default: every dynamic metric)
    #[arg(short, long = "metric")]
    pub metrics: Vec<String>,

    /// Metrics to chart from the in-memory buffer (default: all monitored)
    #[arg(long = "show")]
    pub displayed: Vec<String>,

    /// Update interval in seconds (10, 30, 60 or 300)
    #[arg(short, long)]
    pub interval: Option<UpdateInterval>,

    /// Stop after this many ticks
    #[arg(long)]
    pub max_ticks: Option<u64>,

    /// Start paused; type 's' and Enter to begin
    #[arg(long)]
    pub paused: bool,
}

/// Keyboard command read from stdin while monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Start,
    Pause,
    StopAndClear,
    Quit,
}

impl Control {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "s" | "start" => Some(Control::Start),
            "p" | "pause" => Some(Control::Pause),
            "c" | "clear" | "stop" => Some(Control::StopAndClear),
            "q" | "quit" | "exit" => Some(Control::Quit),
            _ => None,
        }
    }

    /// Forward to the scheduler, returning false when monitoring should end
    fn apply(self, handle: &MonitorHandle, output: &OutputManager) -> Result<bool> {
        match self {
            Control::Start => {
                handle.start();
                output.print_info("Monitoring resumed")?;
            }
            Control::Pause => {
                handle.pause();
                output.print_info("Monitoring paused")?;
            }
            Control::StopAndClear => {
                handle.stop_and_clear();
                output.print_info("Monitoring stopped, buffers and alerts cleared")?;
            }
            Control::Quit => {
                handle.shutdown();
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Read stdin lines on a plain thread so a pending read never holds up exit
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

pub async fn run(args: MonitorArgs, config: EngineConfig, output: OutputManager) -> Result<()> {
    let catalog = load_catalog(&config)?;
    if catalog.dynamic_metrics().is_empty() {
        return Err(CliError::InvalidArgument(
            "No dynamic_single metrics defined in the sections file".to_string(),
        ));
    }

    let selected = (!args.metrics.is_empty()).then_some(args.metrics.as_slice());
    let mut monitor = build_monitor(&config, catalog, Arc::new(SystemProbe::new()), selected)?;
    if monitor.session().selected().is_empty() {
        return Err(CliError::InvalidArgument("Select at least one metric to monitor".to_string()));
    }
    if !args.displayed.is_empty() {
        monitor.session_mut().set_displayed(args.displayed.iter().cloned())?;
    }

    let interval = match args.interval {
        Some(interval) => interval,
        None => config.monitor.interval()?,
    };

    output.print_info(&format!(
        "Monitoring {} metrics every {}, logging to {}",
        monitor.session().selected().len(),
        interval,
        config.paths.history_file.display()
    ))?;
    output.print_info("Commands: [s]tart, [p]ause, [c]lear, [q]uit, then Enter")?;
    output.print_tick_header();

    let scheduler = MonitorScheduler::new(monitor, interval).with_max_ticks(args.max_ticks);
    let (handle, mut reports, task) = scheduler.spawn();
    if !args.paused {
        handle.start();
    }

    let mut stdin = spawn_stdin_reader();
    let mut stdin_open = true;
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            report = reports.recv() => match report {
                Some(report) => {
                    ticks += 1;
                    output.print_tick(&report)?;
                }
                None => break,
            },
            line = stdin.recv(), if stdin_open => match line {
                Some(line) => match Control::parse(&line) {
                    Some(control) => {
                        if !control.apply(&handle, &output)? {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => output.print_warning(&format!("Unknown command: {}", line.trim()))?,
                },
                None => {
                    debug!("stdin closed, keyboard controls disabled");
                    stdin_open = false;
                }
            },
            result = tokio::signal::ctrl_c() => {
                result?;
                handle.shutdown();
                break;
            }
        }
    }

    // Print whatever the last tick produced
    while let Some(report) = reports.recv().await {
        ticks += 1;
        output.print_tick(&report)?;
    }

    let monitor = task
        .await
        .map_err(|e| EngineError::Scheduling(format!("Monitoring task failed: {}", e)))?;

    if output.format() == OutputFormat::Table {
        let breaches = monitor.session().breaches();
        output.print_success(&format!(
            "Stopped after {} ticks, {} active alerts",
            ticks,
            breaches.len()
        ))?;
    }
    Ok(())
}
