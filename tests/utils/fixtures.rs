//! Sections and history fixtures

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use hftmon_engine::history::{HistoryLog, HistoryRecord};
use hftmon_engine::sections::SectionsCatalog;

const HEADER: &str =
    "Section_Title,Subsection_Title,Command,Type,Threshold_Min,Threshold_Max,Unit,HFT_Profile,Require_Output";

/// One row of a generated sections file
#[derive(Debug, Clone, Default)]
pub struct SectionRow {
    pub section: String,
    pub name: String,
    pub command: String,
    pub kind: &'static str,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub unit: String,
    pub profile: String,
    pub require_output: bool,
}

impl SectionRow {
    /// `dynamic_single` row
    pub fn dynamic(section: &str, name: &str, command: &str) -> Self {
        Self {
            section: section.to_string(),
            name: name.to_string(),
            command: command.to_string(),
            kind: "dynamic_single",
            ..Self::default()
        }
    }

    /// `static` row
    pub fn fixed(section: &str, name: &str, command: &str) -> Self {
        Self {
            section: section.to_string(),
            name: name.to_string(),
            command: command.to_string(),
            kind: "static",
            ..Self::default()
        }
    }

    pub fn thresholds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    pub fn profile(mut self, profile: &str) -> Self {
        self.profile = profile.to_string();
        self
    }

    pub fn require_output(mut self) -> Self {
        self.require_output = true;
        self
    }

    fn to_csv_line(&self) -> String {
        let quote = |field: &str| {
            if field.contains(|c: char| matches!(c, ',' | '"' | '\n')) {
                format!("\"{}\"", field.replace('"', "\"\""))
            } else {
                field.to_string()
            }
        };
        let number = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();

        [
            quote(&self.section),
            quote(&self.name),
            quote(&self.command),
            self.kind.to_string(),
            number(self.min),
            number(self.max),
            quote(&self.unit),
            quote(&self.profile),
            if self.require_output { "yes" } else { "" }.to_string(),
        ]
        .join(",")
    }
}

/// Sections CSV with the full header
pub fn sections_csv(rows: &[SectionRow]) -> String {
    let mut csv = String::from(HEADER);
    csv.push('\n');
    for row in rows {
        csv.push_str(&row.to_csv_line());
        csv.push('\n');
    }
    csv
}

/// Parse rows into a catalog without touching the filesystem
pub fn catalog(rows: &[SectionRow]) -> Result<SectionsCatalog> {
    let csv = sections_csv(rows);
    SectionsCatalog::from_reader(csv.as_bytes(), "fixture.csv").context("fixture catalog")
}

/// Write `sections_config.csv` into `dir`
pub fn write_sections(dir: &Path, rows: &[SectionRow]) -> Result<PathBuf> {
    let path = dir.join("sections_config.csv");
    fs::write(&path, sections_csv(rows)).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Append records through the history log, creating the file
pub fn write_history(path: &Path, records: &[HistoryRecord]) -> Result<()> {
    let log = HistoryLog::new(path);
    for record in records {
        log.append(record)?;
    }
    Ok(())
}

/// History record shorthand
pub fn record(timestamp: NaiveDateTime, metric: &str, value: Option<f64>, unit: &str) -> HistoryRecord {
    HistoryRecord {
        timestamp,
        metric: metric.to_string(),
        value,
        unit: unit.to_string(),
    }
}

/// Timestamp on day `day` of May 2024
pub fn at(day: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .unwrap_or_default()
}

/// Small catalog shared by the pipeline tests: one latency metric with a
/// band, one numeric metric without thresholds, one text metric, one
/// interface-dependent metric and a static row
pub fn latency_rows() -> Vec<SectionRow> {
    vec![
        SectionRow::fixed("CPU", "Model", "lscpu").profile("Latency"),
        SectionRow::dynamic("CPU", "Load", "cat /proc/loadavg")
            .thresholds(Some(0.0), Some(4.0))
            .unit("load")
            .profile("Latency"),
        SectionRow::dynamic("CPU", "Context Switches", "vmstat 1 2").unit("/s"),
        SectionRow::dynamic("CPU", "Governor", "cat scaling_governor").profile("Latency"),
        SectionRow::dynamic("Network", "RX Drops", "ethtool -S {iface}")
            .thresholds(None, Some(0.0))
            .unit("pkts")
            .profile("Network"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_survive_the_catalog_loader() {
        let catalog = catalog(&latency_rows()).unwrap();
        assert_eq!(catalog.entries().len(), 5);
        assert_eq!(catalog.dynamic_metrics().len(), 4);

        let drops = catalog.metric("RX Drops").unwrap();
        assert_eq!(drops.min, None);
        assert_eq!(drops.max, Some(0.0));
        assert_eq!(drops.profile, "Network");
        assert!(!drops.require_output);
    }

    #[test]
    fn test_fields_with_commas_are_quoted() {
        let row = SectionRow::fixed("Memory", "NUMA", "numactl -H | awk '{print $1,$2}'").require_output();
        let catalog = catalog(&[row]).unwrap();
        let entry = &catalog.entries()[0];
        assert_eq!(entry.command, "numactl -H | awk '{print $1,$2}'");
        assert!(entry.require_output);
    }
}
