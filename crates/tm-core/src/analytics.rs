//! Time-bucketed totals and per-tag rankings over a user's entries.
//!
//! Buckets are walked backward from an anchor in fixed-width steps. Every
//! bucket of one granularity has the same width; the "month" width is a
//! synthetic 4.34524 weeks, not a calendar month.
//!
//! All offsets use the "UTC minus local" convention: a viewer at UTC+2 passes
//! `-7200`, and local wall time is `utc - offset`.

use std::collections::HashMap;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::model::{Entry, Tag};
use crate::types::{TagId, ValidationError};

pub const SECONDS_PER_DAY: i64 = 86_400;
pub const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;
/// 4.34524 weeks. Kept in milliseconds so the width stays an exact integer.
pub const MILLIS_PER_MONTH: i64 = 2_628_001_152;

/// Largest accepted UTC offset magnitude: fourteen hours.
pub const MAX_UTC_OFFSET: i64 = 14 * 3_600;

const DAY_BUCKETS: usize = 14;
const WEEK_BUCKETS: usize = 52;
const MONTH_BUCKETS: usize = 12;

/// One labelled total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub label: String,
    /// Duration formatted as `HH:MM`.
    pub value: String,
}

/// Rolled-up totals for one user. Bucket rows are newest first; tag rows are
/// largest total first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analytics {
    pub day: Vec<Row>,
    pub week: Vec<Row>,
    pub month: Vec<Row>,
    pub tags: Vec<Row>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    const fn width_ms(self) -> i64 {
        match self {
            Self::Day => SECONDS_PER_DAY * 1_000,
            Self::Week => SECONDS_PER_WEEK * 1_000,
            Self::Month => MILLIS_PER_MONTH,
        }
    }

    const fn bucket_count(self) -> usize {
        match self {
            Self::Day => DAY_BUCKETS,
            Self::Week => WEEK_BUCKETS,
            Self::Month => MONTH_BUCKETS,
        }
    }

    const fn label_format(self) -> &'static str {
        match self {
            Self::Day => "%a",
            Self::Week => "%d. %b",
            Self::Month => "%b. %Y",
        }
    }

    /// Lower edge of the `k`th bucket counted back from `anchor`.
    ///
    /// Flooring the fractional month offset keeps integer start times on the
    /// same side of the edge as the exact fractional boundary.
    fn edge(self, anchor: i64, k: usize) -> i64 {
        let k = i64::try_from(k).unwrap_or(i64::MAX);
        anchor.saturating_sub(k.saturating_mul(self.width_ms()) / 1_000)
    }
}

/// The instants bucket walks start from, in UTC seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchors {
    /// Most recent local midnight.
    pub day: i64,
    /// Local midnight of the current week's Monday.
    pub week: i64,
    /// Local midnight minus the local day-of-week (Sunday = 0) in days.
    pub month: i64,
}

impl Anchors {
    /// Saturates instead of overflowing; callers bound `utc_offset` with
    /// [`check_utc_offset`].
    pub const fn at(now: i64, utc_offset: i64) -> Self {
        let local = now.saturating_sub(utc_offset);
        let local_midnight = local - local.rem_euclid(SECONDS_PER_DAY);
        // 1970-01-01 was a Thursday.
        let weekday = (local.div_euclid(SECONDS_PER_DAY) + 4).rem_euclid(7);
        let days_since_monday = (weekday + 6) % 7;

        let day = local_midnight.saturating_add(utc_offset);
        Self {
            day,
            week: day.saturating_sub(days_since_monday * SECONDS_PER_DAY),
            month: day.saturating_sub(weekday * SECONDS_PER_DAY),
        }
    }
}

/// Rejects offsets beyond [`MAX_UTC_OFFSET`] in either direction.
pub const fn check_utc_offset(value: i64) -> Result<i64, ValidationError> {
    if value < -MAX_UTC_OFFSET || value > MAX_UTC_OFFSET {
        return Err(ValidationError::UtcOffsetOutOfRange { value });
    }
    Ok(value)
}

/// Formats seconds as zero-padded `HH:MM`. Hours are uncapped and leftover
/// seconds are dropped.
pub fn format_hhmm(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3_600;
    let minutes = (seconds % 3_600) / 60;
    format!("{hours:02}:{minutes:02}")
}

/// Computes every analytics view for `entries` as seen at `now`.
pub fn aggregate(entries: &[Entry], tags: &[Tag], now: i64, utc_offset: i64) -> Analytics {
    let anchors = Anchors::at(now, utc_offset);
    Analytics {
        day: sum_by_interval(entries, anchors.day, Granularity::Day, utc_offset),
        week: sum_by_interval(entries, anchors.week, Granularity::Week, utc_offset),
        month: sum_by_interval(entries, anchors.month, Granularity::Month, utc_offset),
        tags: rank_tags(entries, tags),
    }
}

/// Walks back from `anchor`, assigning each entry to the newest bucket whose
/// lower edge is at or before its start.
fn sum_by_interval(
    entries: &[Entry],
    anchor: i64,
    granularity: Granularity,
    utc_offset: i64,
) -> Vec<Row> {
    if entries.is_empty() {
        return Vec::new();
    }

    let mut remaining: Vec<&Entry> = entries.iter().collect();
    let mut rows = Vec::with_capacity(granularity.bucket_count());

    for k in 0..granularity.bucket_count() {
        let edge = granularity.edge(anchor, k);
        let (inside, older): (Vec<&Entry>, Vec<&Entry>) = remaining
            .into_iter()
            .partition(|entry| entry.start_time_utc >= edge);
        let total = inside
            .iter()
            .fold(0_i64, |total, entry| total.saturating_add(entry.duration_secs()));

        rows.push(Row {
            label: bucket_label(edge.saturating_sub(utc_offset), granularity),
            value: format_hhmm(total),
        });
        remaining = older;
    }

    rows
}

/// Renders the local wall time of a bucket edge.
fn bucket_label(local_seconds: i64, granularity: Granularity) -> String {
    DateTime::from_timestamp(local_seconds, 0).map_or_else(
        || local_seconds.to_string(),
        |instant| instant.format(granularity.label_format()).to_string(),
    )
}

/// Sums duration per tag, largest first. Ties keep first-seen order.
/// Entries whose tag is not in `tags` are skipped.
fn rank_tags(entries: &[Entry], tags: &[Tag]) -> Vec<Row> {
    let names: HashMap<TagId, &str> = tags.iter().map(|tag| (tag.id, tag.name.as_str())).collect();

    let mut totals: Vec<(&str, i64)> = Vec::new();
    let mut index: HashMap<TagId, usize> = HashMap::new();
    for entry in entries {
        let Some(&name) = names.get(&entry.tag_id) else {
            continue;
        };
        match index.get(&entry.tag_id) {
            Some(&i) => totals[i].1 = totals[i].1.saturating_add(entry.duration_secs()),
            None => {
                index.insert(entry.tag_id, totals.len());
                totals.push((name, entry.duration_secs()));
            }
        }
    }

    totals.sort_by_key(|&(_, total)| std::cmp::Reverse(total));
    totals
        .into_iter()
        .map(|(name, total)| Row {
            label: name.to_string(),
            value: format_hhmm(total),
        })
        .collect()
}
