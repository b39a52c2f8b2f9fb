//! Sections catalog
//!
//! Loads the tabular command catalog (`sections_config.csv`) into strongly
//! typed [`MetricDefinition`] records. Every row is normalized and validated
//! once at load time; the resulting [`SectionsCatalog`] is immutable.

use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, ConfigResult};

/// Profile name that selects every section
pub const ALL_SECTIONS: &str = "All Sections";

/// Subsection title used when the row leaves it blank
pub const UNTITLED: &str = "Untitled";

/// Placeholder substituted with the primary network interface
pub const IFACE_PLACEHOLDER: &str = "{iface}";

const REQUIRED_COLUMNS: [&str; 3] = ["Section_Title", "Subsection_Title", "Command"];

/// Kind of a catalog row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Informational command, run once during collection
    Static,
    /// Numeric metric that can be monitored against thresholds
    DynamicSingle,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Static => "static",
            MetricKind::DynamicSingle => "dynamic_single",
        }
    }
}

/// One row of the sections catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Section title
    pub section: String,

    /// Subsection title, the metric name for dynamic rows
    pub name: String,

    /// Command template, may contain `{iface}`
    pub command: String,

    /// Row kind
    pub kind: MetricKind,

    /// Lower threshold
    pub min: Option<f64>,

    /// Upper threshold
    pub max: Option<f64>,

    /// Display unit
    pub unit: String,

    /// Profile tag, empty when untagged
    pub profile: String,

    /// Whether empty output counts as a failure
    pub require_output: bool,
}

impl MetricDefinition {
    pub fn is_dynamic(&self) -> bool {
        self.kind == MetricKind::DynamicSingle
    }

    /// Command with `{iface}` replaced by the given interface name
    pub fn render_command(&self, iface: &str) -> String {
        self.command.replace(IFACE_PLACEHOLDER, iface)
    }

    /// A value breaches when it is a number and falls outside the configured band.
    /// NaN never breaches.
    pub fn is_breach(&self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        let below = self.min.map_or(false, |min| value < min);
        let above = self.max.map_or(false, |max| value > max);
        below || above
    }

    /// Human readable threshold band, e.g. `Min: 0 | Max: 80 (%)`
    pub fn threshold_display(&self) -> String {
        let min = self.min.map_or_else(|| "—".to_string(), |v| v.to_string());
        let max = self.max.map_or_else(|| "—".to_string(), |v| v.to_string());
        let mut display = format!("Min: {} | Max: {}", min, max);
        if !self.unit.is_empty() {
            display.push_str(&format!(" ({})", self.unit));
        }
        display
    }
}

/// Rows grouped under one section title, in catalog order
#[derive(Debug, Clone)]
pub struct Section<'a> {
    pub title: &'a str,
    pub entries: Vec<&'a MetricDefinition>,
}

/// Validated, immutable command catalog
#[derive(Debug, Clone)]
pub struct SectionsCatalog {
    source: PathBuf,
    entries: Vec<MetricDefinition>,
}

/// Column positions resolved from the header row
struct ColumnMap {
    section: usize,
    subsection: usize,
    command: usize,
    kind: Option<usize>,
    min: Option<usize>,
    max: Option<usize>,
    unit: Option<usize>,
    profile: Option<usize>,
    require_output: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &[String]) -> ConfigResult<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|column| find(column).is_none())
            .map(|column| column.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(ConfigError::MissingColumns {
                missing,
                found: headers.to_vec(),
            });
        }

        Ok(Self {
            section: find("Section_Title").unwrap_or_default(),
            subsection: find("Subsection_Title").unwrap_or_default(),
            command: find("Command").unwrap_or_default(),
            kind: find("Type"),
            min: find("Threshold_Min"),
            max: find("Threshold_Max"),
            unit: find("Unit"),
            profile: find("HFT_Profile"),
            require_output: find("Require_Output"),
        })
    }
}

impl SectionsCatalog {
    /// Load the catalog from a CSV file
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        let file = File::open(path).map_err(|_| ConfigError::NotFound {
            path: path.display().to_string(),
        })?;

        let catalog = Self::from_reader(file, path)?;
        debug!(
            path = %path.display(),
            rows = catalog.entries.len(),
            dynamic = catalog.dynamic_metrics().len(),
            "Loaded sections catalog"
        );
        Ok(catalog)
    }

    /// Parse a catalog from any CSV source. `source` is only used in messages.
    pub fn from_reader<R: Read, P: AsRef<Path>>(reader: R, source: P) -> ConfigResult<Self> {
        let source = source.as_ref().to_path_buf();
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| parse_error(&e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| parse_error(&e))?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            records.push(record);
        }

        if records.is_empty() {
            return Err(ConfigError::Empty {
                path: source.display().to_string(),
            });
        }

        let columns = ColumnMap::resolve(&headers)?;

        let mut entries = Vec::with_capacity(records.len());
        for record in &records {
            if let Some(entry) = normalize_row(record, &columns) {
                entries.push(entry);
            }
        }

        validate_entries(&entries)?;

        Ok(Self { source, entries })
    }

    /// Build a catalog from already constructed definitions
    pub fn from_entries(entries: Vec<MetricDefinition>) -> ConfigResult<Self> {
        validate_entries(&entries)?;
        Ok(Self {
            source: PathBuf::new(),
            entries,
        })
    }

    /// Path the catalog was loaded from
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Every row, in file order
    pub fn entries(&self) -> &[MetricDefinition] {
        &self.entries
    }

    /// Rows of kind `dynamic_single`, in file order
    pub fn dynamic_metrics(&self) -> Vec<&MetricDefinition> {
        self.entries.iter().filter(|e| e.is_dynamic()).collect()
    }

    /// Look up a dynamic metric by name
    pub fn metric(&self, name: &str) -> Option<&MetricDefinition> {
        self.entries.iter().find(|e| e.is_dynamic() && e.name == name)
    }

    /// Like [`Self::metric`] but fails for unknown names
    pub fn require_metric(&self, name: &str) -> ConfigResult<&MetricDefinition> {
        self.metric(name).ok_or_else(|| ConfigError::UnknownMetric {
            metric: name.to_string(),
        })
    }

    /// Rows grouped by section title, ordered by first appearance
    pub fn sections(&self) -> Vec<Section<'_>> {
        group_sections(self.entries.iter())
    }

    /// `"All Sections"` followed by the sorted distinct profile tags
    pub fn profiles(&self) -> Vec<String> {
        let distinct: BTreeSet<&str> = self
            .entries
            .iter()
            .map(|e| e.profile.as_str())
            .filter(|p| !p.is_empty())
            .collect();

        std::iter::once(ALL_SECTIONS.to_string())
            .chain(distinct.into_iter().map(str::to_string))
            .collect()
    }

    /// All rows of every section having at least one row tagged with `profile`
    pub fn filter_profile(&self, profile: &str) -> Vec<&MetricDefinition> {
        if profile == ALL_SECTIONS {
            return self.entries.iter().collect();
        }

        let titles: HashSet<&str> = self
            .entries
            .iter()
            .filter(|e| e.profile == profile)
            .map(|e| e.section.as_str())
            .collect();

        self.entries
            .iter()
            .filter(|e| titles.contains(e.section.as_str()))
            .collect()
    }

    /// Profile subset grouped by section
    pub fn profile_sections(&self, profile: &str) -> Vec<Section<'_>> {
        group_sections(self.filter_profile(profile).into_iter())
    }
}

fn group_sections<'a, I>(entries: I) -> Vec<Section<'a>>
where
    I: Iterator<Item = &'a MetricDefinition>,
{
    let mut sections: Vec<Section<'a>> = Vec::new();
    for entry in entries {
        match sections.iter_mut().find(|s| s.title == entry.section) {
            Some(section) => section.entries.push(entry),
            None => sections.push(Section {
                title: &entry.section,
                entries: vec![entry],
            }),
        }
    }
    sections
}

fn parse_error(error: &csv::Error) -> ConfigError {
    ConfigError::Parse {
        line: error.position().map(|p| p.line()).unwrap_or(0),
        reason: error.to_string(),
    }
}

/// Trimmed cell text with spreadsheet `nan` treated as blank
fn cell(record: &csv::StringRecord, index: Option<usize>) -> String {
    let value = index.and_then(|i| record.get(i)).unwrap_or("").trim();
    if value.eq_ignore_ascii_case("nan") {
        String::new()
    } else {
        value.to_string()
    }
}

fn parse_threshold(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| !v.is_nan())
}

fn parse_truthy(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "y")
}

fn normalize_row(record: &csv::StringRecord, columns: &ColumnMap) -> Option<MetricDefinition> {
    let section = cell(record, Some(columns.section));
    if section.is_empty() {
        return None;
    }

    let mut name = cell(record, Some(columns.subsection));
    if name.is_empty() {
        name = UNTITLED.to_string();
    }

    let raw_kind = cell(record, columns.kind).to_lowercase();
    let kind = match raw_kind.as_str() {
        "" | "static" => MetricKind::Static,
        "dynamic_single" => MetricKind::DynamicSingle,
        other => {
            warn!(section = %section, metric = %name, kind = other, "Unknown Type, treating row as static");
            MetricKind::Static
        }
    };

    Some(MetricDefinition {
        section,
        name,
        command: cell(record, Some(columns.command)),
        kind,
        min: parse_threshold(&cell(record, columns.min)),
        max: parse_threshold(&cell(record, columns.max)),
        unit: cell(record, columns.unit),
        profile: cell(record, columns.profile),
        require_output: parse_truthy(&cell(record, columns.require_output)),
    })
}

fn validate_entries(entries: &[MetricDefinition]) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for entry in entries {
        if let (Some(min), Some(max)) = (entry.min, entry.max) {
            if min > max {
                return Err(ConfigError::InvalidThresholds {
                    metric: entry.name.clone(),
                    min,
                    max,
                });
            }
        }

        if entry.is_dynamic() && !seen.insert(entry.name.as_str()) {
            return Err(ConfigError::DuplicateMetric {
                metric: entry.name.clone(),
            });
        }
    }
    Ok(())
}
