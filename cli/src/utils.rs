use crate::error::{CliError, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use hftmon_engine::history::{parse_timestamp, HistoryRange};
use regex::Regex;
use std::fs;
use std::path::Path;

/// Parse a time window for history queries.
///
/// Accepts relative windows (`today`, `yesterday`, `last-hour`, `last-day`,
/// `last-week`, `last-30m`, `last-6h`, `last-2d`) evaluated against `now`,
/// or an explicit `start..end` / `start to end` range.
pub fn parse_time_range(time_str: &str, now: NaiveDateTime) -> Result<HistoryRange> {
    let time_str = time_str.trim();

    if let Some((start, end)) = split_range(time_str) {
        let start = parse_datetime(start.trim(), false)?;
        let end = parse_datetime(end.trim(), true)?;
        return checked_range(start, end);
    }

    from_relative(time_str, now)
}

fn split_range(time_str: &str) -> Option<(&str, &str)> {
    time_str
        .split_once("..")
        .or_else(|| time_str.split_once(" to "))
}

fn checked_range(start: NaiveDateTime, end: NaiveDateTime) -> Result<HistoryRange> {
    if start > end {
        return Err(CliError::InvalidTimeRange(
            "Start time must be before end time".to_string(),
        ));
    }
    Ok(HistoryRange::new(start, end))
}

fn from_relative(relative: &str, now: NaiveDateTime) -> Result<HistoryRange> {
    let relative = relative.to_lowercase();
    let day_start = |date: NaiveDate| date.and_time(NaiveTime::MIN);

    let (start, end) = match relative.as_str() {
        "today" => (day_start(now.date()), now),
        "yesterday" => {
            let yesterday = now.date() - Duration::days(1);
            (day_start(yesterday), day_start(now.date()) - Duration::microseconds(1))
        }
        "last-hour" => (now - Duration::hours(1), now),
        "last-day" => (now - Duration::days(1), now),
        "last-week" => (now - Duration::weeks(1), now),
        other => {
            let pattern = Regex::new(r"^last-(\d+)([mhd])$")
                .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
            let captures = pattern.captures(other).ok_or_else(|| {
                CliError::InvalidTimeRange(format!(
                    "Unknown relative time: {}. Supported: today, yesterday, last-hour, last-day, last-week, last-<N>m|h|d",
                    relative
                ))
            })?;

            let too_large = || CliError::InvalidTimeRange(format!("Window too large: {}", relative));
            let amount: i64 = captures[1].parse().map_err(|_| too_large())?;
            let window = match &captures[2] {
                "m" => Duration::try_minutes(amount),
                "h" => Duration::try_hours(amount),
                _ => Duration::try_days(amount),
            }
            .ok_or_else(too_large)?;
            let start = now.checked_sub_signed(window).ok_or_else(too_large)?;
            (start, now)
        }
    };

    checked_range(start, end)
}

/// A bare date means the start of that day, or its last instant for `end_of_day`
fn parse_datetime(datetime_str: &str, end_of_day: bool) -> Result<NaiveDateTime> {
    if let Some(timestamp) = parse_timestamp(datetime_str) {
        return Ok(timestamp);
    }

    let formats = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];
    for format in &formats {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(datetime_str, format) {
            return Ok(timestamp);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(datetime_str, "%Y-%m-%d") {
        let time = if end_of_day {
            NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN)
        } else {
            NaiveTime::MIN
        };
        return Ok(date.and_time(time));
    }

    Err(CliError::InvalidTimeRange(format!(
        "Unable to parse datetime: {}. Supported formats: YYYY-MM-DD, YYYY-MM-DD HH:MM[:SS], ISO8601",
        datetime_str
    )))
}

/// Format a timestamp for display
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Truncate a string to a maximum length with ellipsis
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Create the directory if needed and make sure files can be written into it
pub fn check_directory_writable(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }

    if !path.is_dir() {
        return Err(CliError::InvalidArgument(format!(
            "Path is not a directory: {}",
            path.display()
        )));
    }

    let metadata = fs::metadata(path)?;
    if metadata.permissions().readonly() {
        return Err(CliError::InvalidArgument(format!(
            "Directory is not writable: {}",
            path.display()
        )));
    }

    Ok(())
}
