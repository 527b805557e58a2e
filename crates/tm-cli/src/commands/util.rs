//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use tm_core::{Entry, TagId, UserId, check_timestamp, format_hhmm};
use tm_tracker::Tracker;

use crate::Config;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").expect("relative time pattern is valid")
});

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Parse a timestamp into Unix seconds.
///
/// Supports:
/// - `now`
/// - Unix seconds: "1705449600"
/// - RFC 3339: "2024-01-17T09:30:00Z"
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
///
/// Results outside years 1 through 9999 are rejected.
pub fn parse_timestamp(s: &str, now: DateTime<Utc>) -> Result<i64> {
    let seconds = parse_unchecked(s, now)?;
    Ok(check_timestamp(seconds)?)
}

fn parse_unchecked(s: &str, now: DateTime<Utc>) -> Result<i64> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("now") {
        return Ok(now.timestamp());
    }
    if let Ok(seconds) = s.parse::<i64>() {
        return Ok(seconds);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp());
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(s) else {
        bail!(
            "Invalid time: {s}. Use Unix seconds, RFC 3339 (e.g., 2024-01-17T09:30:00Z), 'now', or relative (e.g., '2 hours ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok((now - Duration::minutes(n * minutes_per_unit)).timestamp())
}

/// Renders a Unix timestamp as local wall time, `utc_offset` being UTC minus local.
pub fn format_time(seconds: i64, utc_offset: i64) -> String {
    DateTime::from_timestamp(seconds.saturating_sub(utc_offset), 0).map_or_else(
        || seconds.to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M").to_string(),
    )
}

/// One-line description of an entry: time range, duration, and name.
pub fn describe_entry(entry: &Entry, utc_offset: i64) -> String {
    format!(
        "{} - {} ({}) {}",
        format_time(entry.start_time_utc, utc_offset),
        format_time(entry.end_time_utc, utc_offset),
        format_hhmm(entry.duration_secs()),
        entry.name
    )
}

/// Message for a write rejected because it overlaps `existing`.
pub fn overlap_message(existing: &Entry, utc_offset: i64) -> String {
    format!(
        "overlaps with \"{}\" ({} - {})",
        existing.name,
        format_time(existing.start_time_utc, utc_offset),
        format_time(existing.end_time_utc, utc_offset)
    )
}

/// The user this invocation acts on.
pub fn acting_user(config: &Config) -> Result<UserId> {
    match config.user_id {
        Some(id) if id > 0 => Ok(UserId::new(id)),
        Some(id) => bail!("invalid user ID: {id}"),
        None => bail!(
            "no user configured. Run 'tm user create', then pass --user or set TM_USER_ID"
        ),
    }
}

/// Uses `explicit` if given, otherwise the user's first tag.
pub async fn tag_or_default(
    tracker: &Tracker,
    user_id: UserId,
    explicit: Option<TagId>,
) -> Result<TagId> {
    if let Some(tag_id) = explicit {
        return Ok(tag_id);
    }
    let tags = tracker.list_tags(user_id).await?;
    match tags.first() {
        Some(tag) => Ok(tag.id),
        None => bail!("user {user_id} has no tags. Create one with 'tm tag add'"),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-17T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let now = fixed_now();
        assert_eq!(parse_timestamp("now", now).unwrap(), 1_705_492_800);
        assert_eq!(parse_timestamp("1705449600", now).unwrap(), 1_705_449_600);
        assert_eq!(
            parse_timestamp("2024-01-17T02:00:00+02:00", now).unwrap(),
            1_705_449_600
        );
        assert_eq!(parse_timestamp("2 hours ago", now).unwrap(), 1_705_485_600);
        assert_eq!(parse_timestamp("1 day ago", now).unwrap(), 1_705_406_400);
        assert_eq!(parse_timestamp("30 minutes ago", now).unwrap(), 1_705_491_000);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("yesterday-ish", fixed_now()).unwrap_err();
        assert!(err.to_string().contains("Invalid time"));
    }

    #[test]
    fn test_parse_timestamp_rejects_huge_relative_values() {
        let err = parse_timestamp("99999999 weeks ago", fixed_now()).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_parse_timestamp_rejects_out_of_range_seconds() {
        let err = parse_timestamp("-9223372036854775808", fixed_now()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "timestamp -9223372036854775808 is out of range (years 1 through 9999)"
        );
        assert!(parse_timestamp("253402300800", fixed_now()).is_err());
        assert_eq!(
            parse_timestamp("253402300799", fixed_now()).unwrap(),
            253_402_300_799
        );
    }

    #[test]
    fn test_format_time_applies_offset() {
        assert_eq!(format_time(1_705_449_600, 0), "2024-01-17 00:00");
        assert_eq!(format_time(1_705_449_600, -7_200), "2024-01-17 02:00");
    }

    #[test]
    fn test_acting_user_requires_configuration() {
        let config = Config {
            user_id: None,
            ..Config::default()
        };
        let err = acting_user(&config).unwrap_err();
        assert!(err.to_string().contains("no user configured"));

        let config = Config {
            user_id: Some(4),
            ..Config::default()
        };
        assert_eq!(acting_user(&config).unwrap(), UserId::new(4));
    }
}
