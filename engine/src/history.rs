//! Durable monitoring history
//!
//! [`HistoryLog`] appends one CSV row per sample to the history file;
//! [`HistoryStore`] loads that file back and answers per-metric range
//! queries with summary statistics.
//!
//! The log is append-only and assumes a single writer.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{HistoryError, HistoryResult};

/// Header row of the history file
pub const HISTORY_HEADER: [&str; 4] = ["timestamp", "metric", "value", "unit"];

/// Timestamp format written to the log
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

const ACCEPTED_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Width of the default query window
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// One durable row of the history file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: NaiveDateTime,
    pub metric: String,
    /// `None` when the sample was not a number
    pub value: Option<f64>,
    pub unit: String,
}

/// Parse a timestamp in any of the formats the log has used
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    ACCEPTED_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

fn parse_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Append-only writer for the history file
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first when the file is new
    pub fn append(&self, record: &HistoryRecord) -> HistoryResult<()> {
        let is_new = !self.path.exists();

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        if is_new {
            writer.write_record(HISTORY_HEADER)?;
            debug!(path = %self.path.display(), "Created history log");
        }

        let timestamp = record.timestamp.format(TIMESTAMP_FORMAT).to_string();
        let value = record.value.map(|v| v.to_string()).unwrap_or_default();
        writer.write_record([
            timestamp.as_str(),
            record.metric.as_str(),
            value.as_str(),
            record.unit.as_str(),
        ])?;
        writer.flush()?;
        Ok(())
    }
}

/// Inclusive time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl HistoryRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    /// Last 24 hours of the span, or the whole span when it is shorter
    pub fn default_for(span: HistoryRange) -> Self {
        let start = span.end - Duration::hours(DEFAULT_WINDOW_HOURS);
        Self {
            start: start.max(span.start),
            end: span.end,
        }
    }
}

/// Summary statistics over non-missing values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation, `None` with fewer than two values
    pub std_dev: Option<f64>,
}

impl SummaryStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / count as f64;

        let std_dev = if count < 2 {
            None
        } else {
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            Some(variance.sqrt())
        };

        Some(Self {
            count,
            min,
            max,
            mean,
            std_dev,
        })
    }
}

/// A single (timestamp, value) observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: NaiveDateTime,
    pub value: Option<f64>,
}

/// Result of a history query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryView {
    pub metric: String,

    /// Points inside the applied range, in log order
    pub points: Vec<HistoryPoint>,

    /// Number of points for the metric before range selection
    pub total_points: usize,

    /// First and last timestamp of the whole series
    pub span: Option<HistoryRange>,

    /// Range that was applied, `None` for degenerate series
    pub range: Option<HistoryRange>,

    pub stats: Option<SummaryStats>,

    /// Too few distinct timestamps for range selection
    pub degenerate: bool,
}

impl HistoryView {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// In-memory copy of the history file
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    records: Vec<HistoryRecord>,
}

impl HistoryStore {
    /// Read the whole history file
    pub fn load<P: AsRef<Path>>(path: P) -> HistoryResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(HistoryError::NotFound {
                path: path.display().to_string(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let column = |name: &str, fallback: usize| headers.iter().position(|h| h == name).unwrap_or(fallback);
        let (ts_col, metric_col, value_col, unit_col) =
            (column("timestamp", 0), column("metric", 1), column("value", 2), column("unit", 3));

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for row in reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    warn!(line, error = %e, "Skipping corrupt history row");
                    skipped += 1;
                    continue;
                }
            };
            let line = row.position().map(|p| p.line()).unwrap_or(0);

            let Some(metric) = row.get(metric_col).filter(|m| !m.is_empty()) else {
                warn!(line, "Skipping incomplete history row");
                skipped += 1;
                continue;
            };

            let Some(timestamp) = row.get(ts_col).and_then(parse_timestamp) else {
                warn!(line, "Skipping history row with unparseable timestamp");
                skipped += 1;
                continue;
            };

            records.push(HistoryRecord {
                timestamp,
                metric: metric.to_string(),
                value: row.get(value_col).and_then(parse_value),
                unit: row.get(unit_col).unwrap_or_default().to_string(),
            });
        }

        debug!(path = %path.display(), rows = records.len(), skipped, "Loaded history");
        Ok(Self { records })
    }

    pub fn from_records(records: Vec<HistoryRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted distinct metric names
    pub fn metrics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.iter().map(|r| r.metric.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// Points and statistics for one metric. With no explicit range the
    /// default window applies. Degenerate series ignore the range.
    pub fn query(&self, metric: &str, range: Option<HistoryRange>) -> HistoryView {
        let series: Vec<HistoryPoint> = self
            .records
            .iter()
            .filter(|r| r.metric == metric)
            .map(|r| HistoryPoint {
                timestamp: r.timestamp,
                value: r.value,
            })
            .collect();

        let total_points = series.len();
        let span = match (
            series.iter().map(|p| p.timestamp).min(),
            series.iter().map(|p| p.timestamp).max(),
        ) {
            (Some(start), Some(end)) => Some(HistoryRange::new(start, end)),
            _ => None,
        };

        let degenerate = match span {
            Some(span) => total_points <= 1 || span.start == span.end,
            None => true,
        };

        let (points, applied) = match span {
            Some(span) if !degenerate => {
                let applied = range.unwrap_or_else(|| HistoryRange::default_for(span));
                let points = series.into_iter().filter(|p| applied.contains(p.timestamp)).collect();
                (points, Some(applied))
            }
            _ => (series, None),
        };

        let values: Vec<f64> = points.iter().filter_map(|p| p.value).collect();

        HistoryView {
            metric: metric.to_string(),
            stats: SummaryStats::from_values(&values),
            points,
            total_points,
            span,
            range: applied,
            degenerate,
        }
    }
}
