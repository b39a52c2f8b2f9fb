use std::sync::Arc;

use anyhow::{Context, Result};
use hftmon_engine::collector::SystemCollector;
use hftmon_engine::executor::{FailureReason, GENERIC_FALLBACK, SENSORS_FALLBACK};
use hftmon_engine::interface::FixedProbe;

use crate::mocks::ScriptedRunner;
use crate::test_setup;
use crate::utils::{catalog, SectionRow};

fn rows() -> Vec<SectionRow> {
    vec![
        SectionRow::fixed("CPU", "Model", "lscpu").profile("Latency"),
        SectionRow::fixed("CPU", "Temperatures", "sensors"),
        SectionRow::fixed("CPU", "Notes", ""),
        SectionRow::fixed("Memory", "Huge Pages", "grep Huge /proc/meminfo").require_output(),
        SectionRow::fixed("Network", "Ring", "ethtool -g {iface}").profile("Network"),
        SectionRow::fixed("Network", "Slow", "ss -tin"),
    ]
}

#[tokio::test]
async fn test_collection_classifies_every_row() -> Result<()> {
    test_setup!("collect_all");
    let catalog = catalog(&rows())?;
    let runner = Arc::new(
        ScriptedRunner::new()
            .stdout("lscpu", "Model name: Xeon\n")
            .exit("sensors", 1)
            .stdout("grep Huge /proc/meminfo", "  \n")
            .stdout("ethtool -g eth1", "RX: 4096\n")
            .timeout("ss -tin"),
    );
    let collector = SystemCollector::new(runner.executor(), Arc::new(FixedProbe::new(["lo", "eth1"])));

    let report = collector.collect(&catalog).await;
    assert_eq!(report.interface, "eth1");
    assert!(report.interface_detected());
    assert_eq!(report.sections.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 3);

    // Rows without a command are listed but never run
    let notes = report.entry("CPU", "Notes").context("Notes")?;
    assert!(notes.is_skipped());
    assert_eq!(runner.calls().len(), 5);

    let sensors = report.entry("CPU", "Temperatures").context("Temperatures")?;
    assert_eq!(sensors.output(), SENSORS_FALLBACK);

    let huge = report.entry("Memory", "Huge Pages").context("Huge Pages")?;
    assert_eq!(huge.output(), GENERIC_FALLBACK);
    assert_eq!(
        huge.outcome.as_ref().and_then(|o| o.reason.clone()),
        Some(FailureReason::EmptyOutput)
    );

    let slow = report.entry("Network", "Slow").context("Slow")?;
    assert!(matches!(
        slow.outcome.as_ref().and_then(|o| o.reason.clone()),
        Some(FailureReason::Timeout { .. })
    ));

    let full = report.full_report();
    assert!(full.contains("\n=== CPU ===\n"));
    assert!(full.contains("\n--- Model ---\nModel name: Xeon\n"));
    assert!(full.contains("\n--- Ring ---\nRX: 4096\n"));
    assert!(!full.contains("--- Notes ---"));
    assert!(!full.contains("No network interface detected"));

    let summary = report.summary_markdown();
    assert!(summary.contains("✅ **Ring** → `ethtool -g eth1`"));
    assert!(summary.contains("❌ **Huge Pages** → `grep Huge /proc/meminfo` (no output)"));
    Ok(())
}

#[tokio::test]
async fn test_profile_collection_keeps_whole_sections() -> Result<()> {
    test_setup!("collect_profile");
    let catalog = catalog(&rows())?;
    let runner = Arc::new(ScriptedRunner::new().stdout("ethtool -g unknown", "RX: 512\n"));
    let collector = SystemCollector::new(runner.executor(), Arc::new(FixedProbe::new(["lo"])));

    let entries = catalog.filter_profile("Network");
    let report = collector.collect_entries(&entries).await;

    assert_eq!(report.sections.len(), 1);
    assert_eq!(report.sections[0].entries.len(), 2);
    assert!(!report.interface_detected());
    assert!(report
        .full_report()
        .contains("Warning: No network interface detected (excluding lo)."));
    assert_eq!(runner.calls(), ["ethtool -g unknown", "ss -tin"]);
    Ok(())
}
