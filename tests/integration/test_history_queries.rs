use std::fs::OpenOptions;
use std::io::Write;

use anyhow::{Context, Result};
use hftmon_engine::error::HistoryError;
use hftmon_engine::history::{HistoryRange, HistoryStore};
use tempfile::TempDir;

use crate::test_setup;
use crate::utils::{at, record, write_history};

fn latency_history(dir: &TempDir) -> Result<std::path::PathBuf> {
    let path = dir.path().join("monitoring_history.csv");
    write_history(
        &path,
        &[
            record(at(1, 9, 0, 0), "Latency", Some(10.0), "us"),
            record(at(1, 10, 0, 0), "Latency", Some(20.0), "us"),
            record(at(1, 11, 0, 0), "Latency", None, "us"),
            record(at(1, 12, 0, 0), "Latency", Some(40.0), "us"),
            record(at(3, 12, 0, 0), "Latency", Some(90.0), "us"),
            record(at(1, 9, 0, 0), "Drops", Some(0.0), "pkts"),
        ],
    )?;
    Ok(path)
}

#[test]
fn test_explicit_range_is_inclusive() -> Result<()> {
    test_setup!("inclusive_range");
    let dir = TempDir::new()?;
    let store = HistoryStore::load(latency_history(&dir)?)?;

    let view = store.query("Latency", Some(HistoryRange::new(at(1, 10, 0, 0), at(1, 12, 0, 0))));
    assert_eq!(view.total_points, 5);
    assert_eq!(view.points.len(), 3);
    assert!(!view.degenerate);

    let stats = view.stats.context("stats")?;
    assert_eq!(stats.count, 2);
    assert_eq!(stats.min, 20.0);
    assert_eq!(stats.max, 40.0);
    assert_eq!(stats.mean, 30.0);
    let std_dev = stats.std_dev.context("std_dev")?;
    assert!((std_dev - 200f64.sqrt()).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_default_window_tracks_newest_sample() -> Result<()> {
    test_setup!("default_window");
    let dir = TempDir::new()?;
    let store = HistoryStore::load(latency_history(&dir)?)?;

    let view = store.query("Latency", None);
    let range = view.range.context("applied range")?;
    assert_eq!(range.end, at(3, 12, 0, 0));
    assert_eq!(range.start, at(2, 12, 0, 0));
    assert_eq!(view.points.len(), 1);
    assert_eq!(view.stats.context("stats")?.std_dev, None);
    Ok(())
}

#[test]
fn test_single_sample_ignores_the_range() -> Result<()> {
    test_setup!("degenerate");
    let dir = TempDir::new()?;
    let store = HistoryStore::load(latency_history(&dir)?)?;

    let view = store.query("Drops", Some(HistoryRange::new(at(20, 0, 0, 0), at(21, 0, 0, 0))));
    assert!(view.degenerate);
    assert_eq!(view.points.len(), 1);
    assert!(view.range.is_none());

    let unknown = store.query("Jitter", None);
    assert!(unknown.is_empty());
    assert!(unknown.stats.is_none());
    Ok(())
}

#[test]
fn test_unparseable_rows_are_skipped() -> Result<()> {
    test_setup!("bad_rows");
    let dir = TempDir::new()?;
    let path = latency_history(&dir)?;

    let mut file = OpenOptions::new().append(true).open(&path)?;
    writeln!(file, "yesterday-ish,Latency,55,us")?;
    writeln!(file, "2024-05-01 13:00:00,Latency,not-a-number,us")?;
    writeln!(file, "2024-05-01T14:00:00,,1,us")?;

    let store = HistoryStore::load(&path)?;
    assert_eq!(store.records().len(), 7);

    // Older space separated timestamps still load, unparseable values become gaps
    let late = store
        .records()
        .iter()
        .find(|r| r.timestamp == at(1, 13, 0, 0))
        .context("13:00 row")?;
    assert_eq!(late.value, None);
    Ok(())
}

#[test]
fn test_missing_history_file() -> Result<()> {
    test_setup!("missing_history");
    let dir = TempDir::new()?;
    let result = HistoryStore::load(dir.path().join("absent.csv"));
    assert!(matches!(result, Err(HistoryError::NotFound { .. })));
    Ok(())
}
