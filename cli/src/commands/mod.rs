pub mod analyze;
pub mod chat;
pub mod collect;
pub mod config;
pub mod history;
pub mod monitor;
pub mod snapshot;

pub use analyze::AnalyzeArgs;
pub use chat::ChatArgs;
pub use collect::CollectArgs;
pub use config::{ConfigAction, ConfigArgs};
pub use history::HistoryArgs;
pub use monitor::MonitorArgs;
pub use snapshot::SnapshotArgs;

use crate::error::{CliError, Result};
use hftmon_engine::sections::{MetricDefinition, SectionsCatalog};

/// Resolve `--metric` names against the catalog; empty means every dynamic metric
pub(crate) fn resolve_metrics<'a>(
    catalog: &'a SectionsCatalog,
    names: &[String],
) -> Result<Vec<&'a MetricDefinition>> {
    if names.is_empty() {
        return Ok(catalog.dynamic_metrics());
    }
    names
        .iter()
        .map(|name| catalog.require_metric(name).map_err(CliError::from))
        .collect()
}

/// Fail unless `profile` is `"All Sections"` or a tag present in the catalog
pub(crate) fn check_profile(catalog: &SectionsCatalog, profile: &str) -> Result<()> {
    let profiles = catalog.profiles();
    if profiles.iter().any(|p| p == profile) {
        Ok(())
    } else {
        Err(CliError::InvalidArgument(format!(
            "Unknown profile '{}'. Available: {}",
            profile,
            profiles.join(", ")
        )))
    }
}
