//! Headless monitoring service
//!
//! Wires settings, catalog, sampler and history log into a running
//! [`MonitorScheduler`] and keeps it alive until a shutdown signal arrives.

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::executor::CommandExecutor;
use crate::history::HistoryLog;
use crate::interface::{InterfaceProbe, SystemProbe};
use crate::monitor::{Monitor, TickReport};
use crate::sampler::Sampler;
use crate::scheduler::MonitorScheduler;
use crate::sections::SectionsCatalog;
use crate::error::{EngineError, Result};

/// Load the sections catalog named by the settings
pub fn load_catalog(config: &EngineConfig) -> Result<Arc<SectionsCatalog>> {
    let catalog = SectionsCatalog::load(&config.paths.sections_file)?;
    Ok(Arc::new(catalog))
}

/// Build a monitor over the catalog. `selected` narrows the default selection.
pub fn build_monitor(
    config: &EngineConfig,
    catalog: Arc<SectionsCatalog>,
    probe: Arc<dyn InterfaceProbe>,
    selected: Option<&[String]>,
) -> Result<Monitor> {
    let executor = CommandExecutor::shell(config.monitor.command_timeout());
    let sampler = Sampler::new(executor, probe);
    let log = HistoryLog::new(&config.paths.history_file);

    let mut monitor = Monitor::new(catalog, sampler, log, config.monitor.buffer_capacity);
    if let Some(names) = selected {
        monitor.session_mut().set_selected(names.iter().cloned())?;
    }
    Ok(monitor)
}

/// Counters reported when the service stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub ticks: u64,
    pub breaching_ticks: u64,
    pub log_errors: u64,
}

impl ServiceStats {
    fn observe(&mut self, report: &TickReport) {
        self.ticks += 1;
        if report.has_breaches() {
            self.breaching_ticks += 1;
        }
        self.log_errors += report.log_errors.len() as u64;
    }
}

/// Monitoring loop driven until shutdown
pub struct MonitorService {
    scheduler: MonitorScheduler,
}

impl MonitorService {
    pub fn new(config: &EngineConfig, selected: Option<&[String]>) -> Result<Self> {
        let catalog = load_catalog(config)?;
        if catalog.dynamic_metrics().is_empty() {
            return Err(EngineError::Scheduling(
                "No dynamic_single metrics defined in the sections file".to_string(),
            ));
        }

        let monitor = build_monitor(config, catalog, Arc::new(SystemProbe::new()), selected)?;
        if monitor.session().selected().is_empty() {
            return Err(EngineError::Scheduling("Select at least one metric to monitor".to_string()));
        }

        let interval = config.monitor.interval()?;
        Ok(Self {
            scheduler: MonitorScheduler::new(monitor, interval),
        })
    }

    /// Run until SIGINT/SIGTERM or until `max_ticks` ticks have run
    pub async fn run(self, max_ticks: Option<u64>) -> Result<ServiceStats> {
        let (handle, mut reports, task) = self.scheduler.with_max_ticks(max_ticks).spawn();
        handle.start();

        let mut stats = ServiceStats::default();
        let shutdown = wait_for_shutdown();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                report = reports.recv() => match report {
                    Some(report) => {
                        log_report(&report);
                        stats.observe(&report);
                    }
                    None => break,
                },
                result = &mut shutdown => {
                    if let Err(e) = result {
                        error!(error = %e, "Signal handling failed");
                    }
                    handle.shutdown();
                    // Drain whatever the last tick produced
                    while let Some(report) = reports.recv().await {
                        log_report(&report);
                        stats.observe(&report);
                    }
                    break;
                }
            }
        }

        let monitor = task
            .await
            .map_err(|e| EngineError::Scheduling(format!("Monitoring task failed: {}", e)))?;
        info!(
            session = %monitor.session_id(),
            ticks = stats.ticks,
            breaching_ticks = stats.breaching_ticks,
            "Monitoring service stopped"
        );
        Ok(stats)
    }
}

fn log_report(report: &TickReport) {
    for reading in &report.readings {
        info!(
            metric = %reading.metric,
            value = ?reading.value,
            unit = %reading.unit,
            breaching = reading.breaching,
            "Sample"
        );
    }
    for breach in &report.breaches {
        warn!(
            metric = %breach.metric,
            value = breach.value,
            since = %breach.since.format("%H:%M:%S"),
            "Threshold breach active"
        );
    }
    for message in &report.log_errors {
        error!(error = %message, "History write failed");
    }
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
            result = signal::ctrl_c() => {
                result?;
                info!("Received SIGINT, initiating graceful shutdown");
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl-C, initiating graceful shutdown");
        Ok(())
    }
}
