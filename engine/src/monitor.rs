//! Threshold monitoring
//!
//! [`MonitorSession`] holds everything a monitoring session mutates: the
//! running flag, metric selection, per-metric sample buffers and the breach
//! table. [`Monitor`] runs one tick at a time against a session. Ticks are
//! deterministic for a given timestamp; the cadence lives in
//! [`crate::scheduler`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{ConfigError, ConfigResult};
use crate::history::{HistoryLog, HistoryPoint, HistoryRecord};
use crate::sampler::{SampleValue, Sampler};
use crate::sections::SectionsCatalog;

/// Samples kept per metric unless configured otherwise
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// A single observation of a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub metric: String,
    pub timestamp: NaiveDateTime,
    /// `None` when the output was not a number or the command failed
    pub value: Option<f64>,
    pub unit: String,
}

impl From<&Sample> for HistoryRecord {
    fn from(sample: &Sample) -> Self {
        HistoryRecord {
            timestamp: sample.timestamp,
            metric: sample.metric.clone(),
            value: sample.value,
            unit: sample.unit.clone(),
        }
    }
}

/// Onset of an ongoing breach
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreachState {
    /// Value that started the breach
    pub value: f64,
    pub since: NaiveDateTime,
}

/// Running flag of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorState {
    Paused,
    Running,
}

/// Bounded FIFO of recent samples for one metric
#[derive(Debug, Clone)]
pub struct MetricBuffer {
    capacity: usize,
    points: VecDeque<HistoryPoint>,
}

impl MetricBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            points: VecDeque::with_capacity(capacity.min(DEFAULT_BUFFER_CAPACITY)),
        }
    }

    /// Push a point, evicting the oldest beyond capacity
    pub fn push(&mut self, point: HistoryPoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }

    pub fn to_vec(&self) -> Vec<HistoryPoint> {
        self.points.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// Explicit state of one monitoring session
#[derive(Debug, Clone)]
pub struct MonitorSession {
    state: MonitorState,
    available: Vec<String>,
    selected: Vec<String>,
    displayed: Vec<String>,
    buffer_capacity: usize,
    buffers: HashMap<String, MetricBuffer>,
    breaches: HashMap<String, BreachState>,
}

impl MonitorSession {
    /// Paused session with every dynamic metric selected and displayed
    pub fn new(catalog: &SectionsCatalog, buffer_capacity: usize) -> Self {
        let available: Vec<String> = catalog.dynamic_metrics().iter().map(|m| m.name.clone()).collect();
        Self {
            state: MonitorState::Paused,
            selected: available.clone(),
            displayed: available.clone(),
            available,
            buffer_capacity,
            buffers: HashMap::new(),
            breaches: HashMap::new(),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == MonitorState::Running
    }

    pub fn start(&mut self) {
        self.state = MonitorState::Running;
    }

    pub fn pause(&mut self) {
        self.state = MonitorState::Paused;
    }

    /// Flip between running and paused, returning the new state
    pub fn toggle(&mut self) -> MonitorState {
        self.state = match self.state {
            MonitorState::Paused => MonitorState::Running,
            MonitorState::Running => MonitorState::Paused,
        };
        self.state
    }

    /// Pause and drop in-memory buffers and breaches. The history file is untouched.
    pub fn stop_and_clear(&mut self) {
        self.state = MonitorState::Paused;
        self.buffers.clear();
        self.breaches.clear();
    }

    pub fn select_all(&mut self) {
        self.selected = self.available.clone();
    }

    pub fn deselect_all(&mut self) {
        self.selected.clear();
    }

    /// Replace the selection. Names must be dynamic metrics of the catalog.
    pub fn set_selected<I, S>(&mut self, names: I) -> ConfigResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected = self.known(names)?;
        Ok(())
    }

    /// Replace the set of metrics whose series are reported
    pub fn set_displayed<I, S>(&mut self, names: I) -> ConfigResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.displayed = self.known(names)?;
        Ok(())
    }

    fn known<I, S>(&self, names: I) -> ConfigResult<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut known = Vec::new();
        for name in names {
            let name = name.into();
            if !self.available.contains(&name) {
                return Err(ConfigError::UnknownMetric { metric: name });
            }
            if !known.contains(&name) {
                known.push(name);
            }
        }
        // Keep catalog order
        known.sort_by_key(|name| self.available.iter().position(|a| a == name));
        Ok(known)
    }

    /// Dynamic metrics of the catalog
    pub fn available(&self) -> &[String] {
        &self.available
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn displayed(&self) -> &[String] {
        &self.displayed
    }

    pub fn buffer(&self, metric: &str) -> Option<&MetricBuffer> {
        self.buffers.get(metric)
    }

    pub fn breach(&self, metric: &str) -> Option<&BreachState> {
        self.breaches.get(metric)
    }

    /// Active breaches in selection order
    pub fn breaches(&self) -> Vec<(String, BreachState)> {
        self.selected
            .iter()
            .filter_map(|name| self.breaches.get(name).map(|state| (name.clone(), *state)))
            .collect()
    }

    /// Update the breach table and buffer for one sample
    pub fn record(&mut self, sample: &Sample, breaching: bool) {
        match (breaching, sample.value) {
            (true, Some(value)) => {
                self.breaches.entry(sample.metric.clone()).or_insert(BreachState {
                    value,
                    since: sample.timestamp,
                });
            }
            _ => {
                self.breaches.remove(&sample.metric);
            }
        }

        let capacity = self.buffer_capacity;
        self.buffers
            .entry(sample.metric.clone())
            .or_insert_with(|| MetricBuffer::new(capacity))
            .push(HistoryPoint {
                timestamp: sample.timestamp,
                value: sample.value,
            });
    }
}

/// Current value of one selected metric after a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub metric: String,
    pub value: Option<f64>,
    /// Value as sampled, before numeric coercion
    pub raw: SampleValue,
    pub unit: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub breaching: bool,
}

/// Active breach as reported by a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreachEntry {
    pub metric: String,
    pub value: f64,
    pub since: NaiveDateTime,
}

/// Buffered series of a displayed metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub metric: String,
    pub points: Vec<HistoryPoint>,
}

/// Consistent snapshot produced by one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub timestamp: NaiveDateTime,
    pub interface: String,
    pub readings: Vec<MetricReading>,
    pub breaches: Vec<BreachEntry>,
    pub series: Vec<MetricSeries>,
    /// History write failures, one message per failed row
    pub log_errors: Vec<String>,
}

impl TickReport {
    pub fn has_breaches(&self) -> bool {
        !self.breaches.is_empty()
    }

    pub fn reading(&self, metric: &str) -> Option<&MetricReading> {
        self.readings.iter().find(|r| r.metric == metric)
    }
}

/// Runs ticks for a session
pub struct Monitor {
    catalog: Arc<SectionsCatalog>,
    sampler: Sampler,
    log: HistoryLog,
    session: MonitorSession,
    session_id: Uuid,
}

impl Monitor {
    pub fn new(catalog: Arc<SectionsCatalog>, sampler: Sampler, log: HistoryLog, buffer_capacity: usize) -> Self {
        let session = MonitorSession::new(&catalog, buffer_capacity);
        Self {
            catalog,
            sampler,
            log,
            session,
            session_id: Uuid::new_v4(),
        }
    }

    pub fn session(&self) -> &MonitorSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut MonitorSession {
        &mut self.session
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn history_log(&self) -> &HistoryLog {
        &self.log
    }

    /// Tick at the current local time
    pub async fn tick(&mut self) -> TickReport {
        self.tick_at(Local::now().naive_local()).await
    }

    /// Sample every selected metric once at `now`, update breaches and
    /// buffers, and append one history row per metric
    pub async fn tick_at(&mut self, now: NaiveDateTime) -> TickReport {
        let span = info_span!("monitor_tick", session = %self.session_id);
        self.run_tick(now).instrument(span).await
    }

    async fn run_tick(&mut self, now: NaiveDateTime) -> TickReport {
        let interface = self.sampler.detect_interface();
        let selected = self.session.selected().to_vec();
        let mut readings = Vec::with_capacity(selected.len());
        let mut log_errors = Vec::new();

        for name in &selected {
            let Some(metric) = self.catalog.metric(name) else {
                warn!(metric = %name, "Selected metric missing from catalog");
                continue;
            };

            let raw = self.sampler.sample_one(metric, &interface).await;
            let value = raw.as_number();
            let breaching = value.map_or(false, |v| metric.is_breach(v));

            let sample = Sample {
                metric: metric.name.clone(),
                timestamp: now,
                value,
                unit: metric.unit.clone(),
            };

            let was_breaching = self.session.breach(name).is_some();
            self.session.record(&sample, breaching);
            if breaching && !was_breaching {
                info!(metric = %name, value = ?value, "Threshold breach started");
            } else if !breaching && was_breaching {
                info!(metric = %name, "Threshold breach cleared");
            }

            if let Err(e) = self.log.append(&HistoryRecord::from(&sample)) {
                warn!(metric = %name, error = %e, "Failed to append history row");
                log_errors.push(format!("{}: {}", name, e));
            }

            readings.push(MetricReading {
                metric: metric.name.clone(),
                value,
                raw,
                unit: metric.unit.clone(),
                min: metric.min,
                max: metric.max,
                breaching,
            });
        }

        let breaches = self
            .session
            .breaches()
            .into_iter()
            .map(|(metric, state)| BreachEntry {
                metric,
                value: state.value,
                since: state.since,
            })
            .collect();

        let series = self
            .session
            .displayed()
            .iter()
            .filter(|name| selected.contains(name))
            .filter_map(|name| {
                self.session.buffer(name).map(|buffer| MetricSeries {
                    metric: name.clone(),
                    points: buffer.to_vec(),
                })
            })
            .collect();

        debug!(metrics = readings.len(), "Tick complete");

        TickReport {
            timestamp: now,
            interface,
            readings,
            breaches,
            series,
            log_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandExecutor;
    use crate::interface::FixedProbe;
    use chrono::{Duration, NaiveDate};
    use std::fs;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    fn at(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 2)
            .unwrap()
            .and_hms_opt(12, 0, second)
            .unwrap()
    }

    /// Catalog whose "Value" metric reads a number from a file we control
    fn setup(dir: &TempDir) -> (Monitor, std::path::PathBuf) {
        let value_file = dir.path().join("value.txt");
        fs::write(&value_file, "5").unwrap();

        let csv = format!(
            "Section_Title,Subsection_Title,Command,Type,Threshold_Min,Threshold_Max,Unit\n\
             Test,Value,cat {},dynamic_single,0,10,ms\n\
             Test,Broken,exit 1,dynamic_single,,,\n\
             Test,Info,uname,static,,,\n",
            value_file.display()
        );
        let catalog = Arc::new(SectionsCatalog::from_reader(csv.as_bytes(), "t.csv").unwrap());
        let sampler = Sampler::new(
            CommandExecutor::shell(StdDuration::from_secs(5)),
            Arc::new(FixedProbe::new(["lo", "eth0"])),
        );
        let log = HistoryLog::new(dir.path().join("history.csv"));
        (Monitor::new(catalog, sampler, log, 3), value_file)
    }

    #[test]
    fn test_buffer_evicts_oldest_first() {
        let mut buffer = MetricBuffer::new(DEFAULT_BUFFER_CAPACITY);
        for i in 0..1005u32 {
            buffer.push(HistoryPoint {
                timestamp: at(0) + Duration::seconds(i as i64),
                value: Some(i as f64),
            });
        }
        assert_eq!(buffer.len(), DEFAULT_BUFFER_CAPACITY);
        assert_eq!(buffer.iter().next().unwrap().value, Some(5.0));
        assert_eq!(buffer.latest().unwrap().value, Some(1004.0));
    }

    #[test]
    fn test_session_lifecycle() {
        let dir = TempDir::new().unwrap();
        let (mut monitor, _) = setup(&dir);
        let session = monitor.session_mut();

        assert_eq!(session.state(), MonitorState::Paused);
        assert_eq!(session.selected(), ["Value", "Broken"]);
        assert_eq!(session.displayed(), ["Value", "Broken"]);

        session.start();
        assert!(session.is_running());
        assert_eq!(session.toggle(), MonitorState::Paused);
        assert_eq!(session.toggle(), MonitorState::Running);

        session.deselect_all();
        assert!(session.selected().is_empty());
        session.select_all();
        assert_eq!(session.selected().len(), 2);

        session.set_selected(["Broken", "Value"]).unwrap();
        assert_eq!(session.selected(), ["Value", "Broken"]);
        assert!(matches!(
            session.set_selected(["Info"]),
            Err(ConfigError::UnknownMetric { .. })
        ));
    }

    #[tokio::test]
    async fn test_tick_logs_every_selected_metric() {
        let dir = TempDir::new().unwrap();
        let (mut monitor, _) = setup(&dir);

        let report = monitor.tick_at(at(0)).await;
        assert_eq!(report.interface, "eth0");
        assert_eq!(report.readings.len(), 2);
        assert_eq!(report.reading("Value").unwrap().value, Some(5.0));
        assert_eq!(report.reading("Broken").unwrap().raw, SampleValue::Error);
        assert!(report.log_errors.is_empty());

        let content = fs::read_to_string(monitor.history_log().path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with(",Value,5,ms"));
        assert!(lines[2].ends_with(",Broken,,"));
    }

    #[tokio::test]
    async fn test_breach_onset_is_preserved_and_cleared() {
        let dir = TempDir::new().unwrap();
        let (mut monitor, value_file) = setup(&dir);
        monitor.session_mut().set_selected(["Value"]).unwrap();

        fs::write(&value_file, "12").unwrap();
        let first = monitor.tick_at(at(0)).await;
        assert_eq!(first.breaches.len(), 1);
        assert_eq!(first.breaches[0].since, at(0));

        fs::write(&value_file, "15").unwrap();
        let second = monitor.tick_at(at(10)).await;
        assert_eq!(second.breaches[0].since, at(0));
        assert_eq!(second.breaches[0].value, 12.0);

        fs::write(&value_file, "7").unwrap();
        let third = monitor.tick_at(at(20)).await;
        assert!(!third.has_breaches());
        assert!(monitor.session().breach("Value").is_none());
    }

    #[tokio::test]
    async fn test_stop_and_clear_keeps_history_file() {
        let dir = TempDir::new().unwrap();
        let (mut monitor, value_file) = setup(&dir);

        fs::write(&value_file, "99").unwrap();
        for second in 0..5 {
            monitor.tick_at(at(second)).await;
        }

        // Buffer capacity is 3 in this fixture
        assert_eq!(monitor.session().buffer("Value").unwrap().len(), 3);
        assert!(monitor.session().breach("Value").is_some());

        monitor.session_mut().start();
        monitor.session_mut().stop_and_clear();
        assert_eq!(monitor.session().state(), MonitorState::Paused);
        assert!(monitor.session().buffer("Value").is_none());
        assert!(monitor.session().breaches().is_empty());

        let content = fs::read_to_string(monitor.history_log().path()).unwrap();
        assert_eq!(content.lines().count(), 11);
    }

    #[tokio::test]
    async fn test_series_only_for_displayed_metrics() {
        let dir = TempDir::new().unwrap();
        let (mut monitor, _) = setup(&dir);
        monitor.session_mut().set_displayed(["Value"]).unwrap();

        let report = monitor.tick_at(at(0)).await;
        assert_eq!(report.series.len(), 1);
        assert_eq!(report.series[0].metric, "Value");
        assert_eq!(report.series[0].points.len(), 1);
    }

    #[tokio::test]
    async fn test_log_write_failure_does_not_abort_tick() {
        let dir = TempDir::new().unwrap();
        let (monitor, _) = setup(&dir);
        let Monitor { catalog, sampler, .. } = monitor;
        let mut monitor = Monitor::new(
            catalog,
            sampler,
            HistoryLog::new(dir.path().join("missing-dir").join("history.csv")),
            3,
        );

        let report = monitor.tick_at(at(0)).await;
        assert_eq!(report.readings.len(), 2);
        assert_eq!(report.log_errors.len(), 2);
        assert_eq!(monitor.session().buffer("Value").unwrap().len(), 1);
    }
}
