//! Snapshot sampling of metric commands

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::executor::CommandExecutor;
use crate::interface::InterfaceProbe;
use crate::sections::MetricDefinition;

/// Longest raw text kept for non-numeric output
pub const MAX_TEXT_CHARS: usize = 100;

/// Value observed for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SampleValue {
    Number(f64),
    /// Non-numeric output, truncated
    Text(String),
    /// The command failed
    Error,
}

impl SampleValue {
    /// Numeric view, `None` for text and errors
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SampleValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Parse command output: a number, else at most 100 characters of text
    pub fn parse(output: &str) -> Self {
        let trimmed = output.trim();
        match trimmed.parse::<f64>() {
            Ok(value) if !value.is_nan() => SampleValue::Number(value),
            _ => SampleValue::Text(trimmed.chars().take(MAX_TEXT_CHARS).collect()),
        }
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Number(value) => write!(f, "{}", value),
            SampleValue::Text(text) => write!(f, "{}", text),
            SampleValue::Error => write!(f, "error"),
        }
    }
}

/// Ordered metric name to value mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Interface substituted for `{iface}` during the pass
    pub interface: String,
    pub values: Vec<(String, SampleValue)>,
}

impl Snapshot {
    pub fn get(&self, name: &str) -> Option<&SampleValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Runs metric commands once and coerces their output
#[derive(Clone)]
pub struct Sampler {
    executor: CommandExecutor,
    probe: Arc<dyn InterfaceProbe>,
}

impl Sampler {
    pub fn new(executor: CommandExecutor, probe: Arc<dyn InterfaceProbe>) -> Self {
        Self { executor, probe }
    }

    /// Detect the primary interface for one pass
    pub fn detect_interface(&self) -> String {
        self.probe.primary_interface()
    }

    /// Sample every metric, detecting the interface once for the whole pass
    pub async fn sample(&self, metrics: &[&MetricDefinition]) -> Snapshot {
        let interface = self.detect_interface();
        let mut values = Vec::with_capacity(metrics.len());
        for metric in metrics {
            let value = self.sample_one(metric, &interface).await;
            values.push((metric.name.clone(), value));
        }
        Snapshot { interface, values }
    }

    /// Sample a single metric with a known interface name
    pub async fn sample_one(&self, metric: &MetricDefinition, interface: &str) -> SampleValue {
        let command = metric.render_command(interface);
        let outcome = self.executor.execute(&command, metric.require_output).await;
        if !outcome.is_success() {
            debug!(metric = %metric.name, reason = %outcome.reason_text(), "Sample failed");
            return SampleValue::Error;
        }
        SampleValue::parse(&outcome.output)
    }
}
