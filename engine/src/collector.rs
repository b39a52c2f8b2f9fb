//! System information collection
//!
//! Runs every command of the catalog once, in order, and renders the raw
//! text report and the markdown summary.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::executor::{CommandExecutor, CommandOutcome};
use crate::interface::{InterfaceProbe, UNKNOWN_INTERFACE};
use crate::sections::{MetricDefinition, SectionsCatalog};

/// Default file name for a saved report
pub const REPORT_FILE_NAME: &str = "system_info.txt";

/// One executed (or skipped) catalog row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedEntry {
    pub name: String,

    /// Command with the interface substituted
    pub command: String,

    /// `None` when the row has no command
    pub outcome: Option<CommandOutcome>,
}

impl CollectedEntry {
    pub fn is_skipped(&self) -> bool {
        self.outcome.is_none()
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.as_ref().map_or(false, CommandOutcome::is_success)
    }

    pub fn output(&self) -> &str {
        self.outcome.as_ref().map_or("", |o| o.output.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedSection {
    pub title: String,
    pub entries: Vec<CollectedEntry>,
}

/// Results of a collection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub started_at: DateTime<Local>,
    pub interface: String,
    pub sections: Vec<CollectedSection>,
}

impl CollectionReport {
    pub fn interface_detected(&self) -> bool {
        self.interface != UNKNOWN_INTERFACE
    }

    /// Rows that actually ran
    pub fn executed(&self) -> impl Iterator<Item = (&str, &CollectedEntry)> {
        self.sections.iter().flat_map(|section| {
            section
                .entries
                .iter()
                .filter(|e| !e.is_skipped())
                .map(move |e| (section.title.as_str(), e))
        })
    }

    pub fn succeeded(&self) -> usize {
        self.executed().filter(|(_, e)| e.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.executed().filter(|(_, e)| !e.succeeded()).count()
    }

    /// True when at least one row had a command
    pub fn has_content(&self) -> bool {
        self.executed().next().is_some()
    }

    pub fn entry(&self, section: &str, name: &str) -> Option<&CollectedEntry> {
        self.sections
            .iter()
            .find(|s| s.title == section)
            .and_then(|s| s.entries.iter().find(|e| e.name == name))
    }

    /// Raw text report
    pub fn full_report(&self) -> String {
        let mut report = String::new();
        let _ = write!(
            report,
            "System metrics collection started at {}\n\n",
            self.started_at.format("%a %b %e %H:%M:%S %Y")
        );

        if !self.interface_detected() {
            report.push_str("Warning: No network interface detected (excluding lo).\n\n");
        }

        for section in &self.sections {
            let _ = write!(report, "\n=== {} ===\n", section.title);
            for entry in &section.entries {
                let Some(outcome) = &entry.outcome else {
                    continue;
                };
                let _ = write!(report, "\n--- {} ---\n", entry.name);
                report.push_str(&outcome.output);
                if !outcome.is_success() {
                    report.push('\n');
                }
            }
        }

        report
    }

    /// Markdown summary with one status line per executed row
    pub fn summary_markdown(&self) -> String {
        let mut summary = String::from("### Data Collection Summary\n\n");

        for section in &self.sections {
            if section.entries.iter().all(CollectedEntry::is_skipped) {
                continue;
            }

            let _ = write!(summary, "**{}**\n\n", section.title);
            for entry in &section.entries {
                let Some(outcome) = &entry.outcome else {
                    continue;
                };
                let icon = if outcome.is_success() { "✅" } else { "❌" };
                let reason = outcome.reason_text();
                let reason_part = if reason.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", reason)
                };
                let _ = write!(summary, "{} **{}** → `{}`{}\n\n", icon, entry.name, entry.command, reason_part);
            }
            summary.push_str("---\n\n");
        }

        summary
    }
}

/// Runs catalog commands for a full report
#[derive(Clone)]
pub struct SystemCollector {
    executor: CommandExecutor,
    probe: Arc<dyn InterfaceProbe>,
}

impl SystemCollector {
    pub fn new(executor: CommandExecutor, probe: Arc<dyn InterfaceProbe>) -> Self {
        Self { executor, probe }
    }

    /// Run every row of the catalog
    pub async fn collect(&self, catalog: &SectionsCatalog) -> CollectionReport {
        let entries: Vec<&MetricDefinition> = catalog.entries().iter().collect();
        self.collect_entries(&entries).await
    }

    /// Run the given rows, grouped by section in first-appearance order
    pub async fn collect_entries(&self, entries: &[&MetricDefinition]) -> CollectionReport {
        let started_at = Local::now();
        let interface = self.probe.primary_interface();
        info!(interface = %interface, rows = entries.len(), "Collecting system information");

        let mut sections: Vec<CollectedSection> = Vec::new();
        for definition in entries {
            let command = definition.render_command(&interface);
            let outcome = if command.trim().is_empty() {
                None
            } else {
                Some(self.executor.execute(&command, definition.require_output).await)
            };

            if let Some(outcome) = &outcome {
                debug!(
                    section = %definition.section,
                    name = %definition.name,
                    status = %outcome.status,
                    "Collected"
                );
            }

            let entry = CollectedEntry {
                name: definition.name.clone(),
                command,
                outcome,
            };

            match sections.iter_mut().find(|s| s.title == definition.section) {
                Some(section) => section.entries.push(entry),
                None => sections.push(CollectedSection {
                    title: definition.section.clone(),
                    entries: vec![entry],
                }),
            }
        }

        let report = CollectionReport {
            started_at,
            interface,
            sections,
        };
        info!(succeeded = report.succeeded(), failed = report.failed(), "Collection complete");
        report
    }
}
