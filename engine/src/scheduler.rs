//! Timer-driven monitoring
//!
//! [`MonitorScheduler`] owns a [`Monitor`] and drives its ticks on a tokio
//! task at a fixed [`UpdateInterval`]. It is controlled through a
//! [`MonitorHandle`]; every [`TickReport`] is forwarded over an mpsc channel.
//!
//! Control signals are queued and applied in order between ticks. A running
//! tick is never interrupted, and tick starts are at least one interval apart.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::monitor::{Monitor, TickReport};

/// Report channel depth
const REPORT_BUFFER: usize = 16;

/// Supported tick cadences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpdateInterval {
    TenSeconds,
    ThirtySeconds,
    #[default]
    OneMinute,
    FiveMinutes,
}

impl UpdateInterval {
    pub const ALL: [UpdateInterval; 4] = [
        UpdateInterval::TenSeconds,
        UpdateInterval::ThirtySeconds,
        UpdateInterval::OneMinute,
        UpdateInterval::FiveMinutes,
    ];

    pub fn from_secs(secs: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|interval| interval.as_secs() == secs)
    }

    pub fn as_secs(&self) -> u64 {
        match self {
            UpdateInterval::TenSeconds => 10,
            UpdateInterval::ThirtySeconds => 30,
            UpdateInterval::OneMinute => 60,
            UpdateInterval::FiveMinutes => 300,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.as_secs())
    }
}

impl fmt::Display for UpdateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} seconds", self.as_secs())
    }
}

impl FromStr for UpdateInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_end_matches('s');
        digits
            .parse::<u64>()
            .ok()
            .and_then(Self::from_secs)
            .ok_or_else(|| format!("invalid update interval '{}', expected one of 10, 30, 60, 300", s))
    }
}

/// Control request for the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Start,
    Pause,
    StopAndClear,
    Shutdown,
}

/// Control side of a running scheduler
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    control: mpsc::UnboundedSender<ControlSignal>,
}

impl MonitorHandle {
    pub fn start(&self) {
        self.send(ControlSignal::Start);
    }

    pub fn pause(&self) {
        self.send(ControlSignal::Pause);
    }

    /// Pause and clear buffers and breaches
    pub fn stop_and_clear(&self) {
        self.send(ControlSignal::StopAndClear);
    }

    /// End the scheduler task after the current tick
    pub fn shutdown(&self) {
        self.send(ControlSignal::Shutdown);
    }

    fn send(&self, signal: ControlSignal) {
        if self.control.send(signal).is_err() {
            debug!(?signal, "Scheduler already stopped");
        }
    }
}

/// Drives [`Monitor`] ticks at a fixed cadence
pub struct MonitorScheduler {
    monitor: Monitor,
    interval: UpdateInterval,
    max_ticks: Option<u64>,
}

impl MonitorScheduler {
    pub fn new(monitor: Monitor, interval: UpdateInterval) -> Self {
        Self {
            monitor,
            interval,
            max_ticks: None,
        }
    }

    /// Stop after `max_ticks` ticks
    pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Spawn the loop on the current runtime. The task returns the monitor
    /// when it ends so callers can inspect the final session.
    pub fn spawn(self) -> (MonitorHandle, mpsc::Receiver<TickReport>, JoinHandle<Monitor>) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::channel(REPORT_BUFFER);

        let task = tokio::spawn(self.run(control_rx, report_tx));
        (MonitorHandle { control: control_tx }, report_rx, task)
    }

    /// Apply a signal, returning false on shutdown
    fn apply(&mut self, signal: ControlSignal) -> bool {
        let session = self.monitor.session_mut();
        match signal {
            ControlSignal::Start => session.start(),
            ControlSignal::Pause => session.pause(),
            ControlSignal::StopAndClear => session.stop_and_clear(),
            ControlSignal::Shutdown => return false,
        }
        debug!(?signal, state = ?session.state(), "Applied control signal");
        true
    }

    async fn run(
        mut self,
        mut control: mpsc::UnboundedReceiver<ControlSignal>,
        reports: mpsc::Sender<TickReport>,
    ) -> Monitor {
        info!(
            session = %self.monitor.session_id(),
            interval = %self.interval,
            "Monitoring scheduler started"
        );

        let mut next_tick = Instant::now();
        let mut ticks = 0u64;

        loop {
            if !self.monitor.session().is_running() {
                match control.recv().await {
                    Some(signal) if self.apply(signal) => continue,
                    _ => break,
                }
            }

            if Instant::now() >= next_tick {
                let started = Instant::now();
                let report = self.monitor.tick().await;
                next_tick = started + self.interval.duration();
                ticks += 1;

                if reports.send(report).await.is_err() {
                    debug!("Report receiver dropped");
                    break;
                }

                if self.max_ticks.map_or(false, |max| ticks >= max) {
                    info!(ticks, "Reached tick limit");
                    break;
                }
            }

            // Queued signals win over a due tick
            tokio::select! {
                biased;
                signal = control.recv() => match signal {
                    Some(signal) if self.apply(signal) => {}
                    _ => break,
                },
                _ = tokio::time::sleep_until(next_tick) => {}
            }
        }

        info!(ticks, "Monitoring scheduler stopped");
        self.monitor
    }
}
