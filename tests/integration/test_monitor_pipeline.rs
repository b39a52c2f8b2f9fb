use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use hftmon_engine::history::{HistoryLog, HistoryStore};
use hftmon_engine::interface::FixedProbe;
use hftmon_engine::monitor::{Monitor, DEFAULT_BUFFER_CAPACITY};
use hftmon_engine::sampler::{SampleValue, Sampler};
use hftmon_engine::scheduler::{MonitorScheduler, UpdateInterval};
use tempfile::TempDir;

use crate::mocks::ScriptedRunner;
use crate::{test_setup, DEFAULT_TEST_TIMEOUT};
use crate::utils::{at, catalog, latency_rows};

fn monitor(runner: &Arc<ScriptedRunner>, history: &Path, interfaces: &[&str], capacity: usize) -> Result<Monitor> {
    let catalog = Arc::new(catalog(&latency_rows())?);
    let sampler = Sampler::new(runner.executor(), Arc::new(FixedProbe::new(interfaces.iter().copied())));
    Ok(Monitor::new(catalog, sampler, HistoryLog::new(history), capacity))
}

fn healthy_host() -> ScriptedRunner {
    ScriptedRunner::new()
        .stdout("cat /proc/loadavg", "0.5\n")
        .exit("vmstat 1 2", 1)
        .stdout("cat scaling_governor", "performance\n")
        .stdout("ethtool -S eth0", "3\n")
}

/// Every selected metric yields exactly one history row per tick, failed
/// and non-numeric samples included
#[tokio::test]
async fn test_tick_writes_one_row_per_metric() -> Result<()> {
    test_setup!("tick_rows");
    let dir = TempDir::new()?;
    let history = dir.path().join("monitoring_history.csv");
    let runner = Arc::new(healthy_host());
    let mut monitor = monitor(&runner, &history, &["lo", "eth0"], DEFAULT_BUFFER_CAPACITY)?;

    let report = monitor.tick_at(at(2, 9, 0, 0)).await;
    assert_eq!(report.interface, "eth0");
    assert_eq!(report.readings.len(), 4);
    assert_eq!(report.reading("Load").context("Load")?.value, Some(0.5));
    assert_eq!(report.reading("Context Switches").context("CS")?.raw, SampleValue::Error);
    assert_eq!(
        report.reading("Governor").context("Governor")?.raw,
        SampleValue::Text("performance".to_string())
    );

    // RX Drops has max 0, so 3 dropped packets breach
    assert_eq!(report.breaches.len(), 1);
    assert_eq!(report.breaches[0].metric, "RX Drops");
    assert_eq!(report.breaches[0].since, at(2, 9, 0, 0));

    let content = fs::read_to_string(&history)?;
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "timestamp,metric,value,unit");
    assert_eq!(lines[1], "2024-05-02T09:00:00.000000,Load,0.5,load");
    assert_eq!(lines[2], "2024-05-02T09:00:00.000000,Context Switches,,/s");
    assert_eq!(lines[3], "2024-05-02T09:00:00.000000,Governor,,");
    assert_eq!(lines[4], "2024-05-02T09:00:00.000000,RX Drops,3,pkts");

    let store = HistoryStore::load(&history)?;
    assert_eq!(store.metrics(), ["Context Switches", "Governor", "Load", "RX Drops"]);
    Ok(())
}

#[tokio::test]
async fn test_breach_onset_survives_until_cleared() -> Result<()> {
    test_setup!("breach_onset");
    let dir = TempDir::new()?;
    let runner = Arc::new(healthy_host().sequence("cat /proc/loadavg", ["5.5", "7.0", "2.0", "nan", "-1"]));
    let mut monitor = monitor(&runner, &dir.path().join("h.csv"), &["eth0"], DEFAULT_BUFFER_CAPACITY)?;
    monitor.session_mut().set_selected(["Load"])?;

    // The queue starts with the healthy 0.5 reading
    let calm = monitor.tick_at(at(2, 9, 0, 0)).await;
    assert!(!calm.has_breaches());

    let onset = monitor.tick_at(at(2, 9, 0, 10)).await;
    assert_eq!(onset.breaches[0].value, 5.5);
    assert_eq!(onset.breaches[0].since, at(2, 9, 0, 10));

    let ongoing = monitor.tick_at(at(2, 9, 0, 20)).await;
    assert!(ongoing.reading("Load").context("Load")?.breaching);
    assert_eq!(ongoing.breaches[0].value, 5.5);
    assert_eq!(ongoing.breaches[0].since, at(2, 9, 0, 10));

    let cleared = monitor.tick_at(at(2, 9, 0, 30)).await;
    assert!(!cleared.has_breaches());
    assert!(monitor.session().breach("Load").is_none());

    // NaN output is not a number and never breaches
    let nan = monitor.tick_at(at(2, 9, 0, 40)).await;
    let reading = nan.reading("Load").context("Load")?;
    assert_eq!(reading.value, None);
    assert!(!reading.breaching);

    let below = monitor.tick_at(at(2, 9, 0, 50)).await;
    assert_eq!(below.breaches[0].since, at(2, 9, 0, 50));
    Ok(())
}

#[tokio::test]
async fn test_buffer_is_bounded_but_history_is_not() -> Result<()> {
    test_setup!("buffer_bound");
    let dir = TempDir::new()?;
    let history = dir.path().join("h.csv");
    let runner = Arc::new(ScriptedRunner::new().sequence("cat /proc/loadavg", (0..1005).map(|i| i.to_string())));
    let mut monitor = monitor(&runner, &history, &["eth0"], DEFAULT_BUFFER_CAPACITY)?;
    monitor.session_mut().set_selected(["Load"])?;

    let start = at(3, 0, 0, 0);
    for i in 0..1005 {
        monitor.tick_at(start + chrono::Duration::seconds(i)).await;
    }

    let buffer = monitor.session().buffer("Load").context("Load buffer")?;
    assert_eq!(buffer.len(), DEFAULT_BUFFER_CAPACITY);
    assert_eq!(buffer.iter().next().and_then(|p| p.value), Some(5.0));
    assert_eq!(buffer.latest().and_then(|p| p.value), Some(1004.0));

    let view = HistoryStore::load(&history)?.query("Load", None);
    assert_eq!(view.total_points, 1005);
    Ok(())
}

#[tokio::test]
async fn test_missing_interface_is_substituted_as_unknown() -> Result<()> {
    test_setup!("unknown_iface");
    let dir = TempDir::new()?;
    let runner = Arc::new(ScriptedRunner::new().stdout("ethtool -S unknown", "0"));
    let mut monitor = monitor(&runner, &dir.path().join("h.csv"), &["lo"], DEFAULT_BUFFER_CAPACITY)?;
    monitor.session_mut().set_selected(["RX Drops"])?;

    let report = monitor.tick_at(at(2, 9, 0, 0)).await;
    assert_eq!(report.interface, "unknown");
    assert_eq!(report.reading("RX Drops").context("RX Drops")?.value, Some(0.0));
    assert_eq!(runner.calls(), ["ethtool -S unknown"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_feeds_history() -> Result<()> {
    test_setup!("scheduler_history");
    let dir = TempDir::new()?;
    let history = dir.path().join("h.csv");
    let runner = Arc::new(healthy_host());
    let monitor = monitor(&runner, &history, &["eth0"], DEFAULT_BUFFER_CAPACITY)?;

    let (handle, mut reports, task) = MonitorScheduler::new(monitor, UpdateInterval::TenSeconds)
        .with_max_ticks(Some(2))
        .spawn();
    handle.start();

    let mut received = 0;
    while let Some(report) = tokio::time::timeout(DEFAULT_TEST_TIMEOUT, reports.recv()).await? {
        assert_eq!(report.readings.len(), 4);
        received += 1;
    }
    assert_eq!(received, 2);

    let monitor = task.await?;
    assert_eq!(monitor.session().buffer("Load").context("Load buffer")?.len(), 2);
    assert_eq!(runner.call_count("cat /proc/loadavg"), 2);

    let store = HistoryStore::load(&history)?;
    assert_eq!(store.records().len(), 8);
    Ok(())
}
