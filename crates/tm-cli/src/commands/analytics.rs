//! Analytics command: time per day, week, month, and tag.

use std::io::Write;

use anyhow::Result;
use chrono::Utc;
use clap::Args;

use tm_core::{Analytics, Row, check_utc_offset};
use tm_tracker::Tracker;

use super::util::{acting_user, parse_timestamp};
use crate::Config;

#[derive(Debug, Args)]
pub struct AnalyticsArgs {
    /// UTC minus local time, in seconds (UTC+2 is -7200). Defaults to config, then the system offset.
    #[arg(long, allow_hyphen_values = true, value_parser = parse_offset)]
    pub offset: Option<i64>,

    /// Compute as of this time instead of now.
    #[arg(long)]
    pub at: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Parses `--offset`, rejecting values beyond fourteen hours either way.
fn parse_offset(s: &str) -> Result<i64, String> {
    let value: i64 = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid offset: {s}"))?;
    check_utc_offset(value).map_err(|err| err.to_string())
}

/// Parses an `HH:MM` total back into minutes.
fn row_minutes(row: &Row) -> i64 {
    row.value
        .split_once(':')
        .and_then(|(h, m)| Some(h.parse::<i64>().ok()? * 60 + m.parse::<i64>().ok()?))
        .unwrap_or(0)
}

// ========== Progress Bar ==========

/// Generates a 10-character progress bar.
/// Values <5% of max get a single block for visibility.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn progress_bar(value: i64, max: i64) -> String {
    if max <= 0 {
        return "░░░░░░░░░░".to_string();
    }

    let ratio = value as f64 / max as f64;
    let filled = if ratio < 0.05 && value > 0 {
        1
    } else {
        (ratio * 10.0).round().clamp(0.0, 10.0) as usize
    };

    let empty = 10 - filled;
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

fn write_section<W: Write>(writer: &mut W, title: &str, rows: &[Row]) -> Result<()> {
    writeln!(writer, "{title}")?;
    writeln!(writer, "{}", "─".repeat(title.chars().count()))?;
    for row in rows {
        writeln!(writer, "{:<12} {:>7}", row.label, row.value)?;
    }
    Ok(())
}

fn write_tags<W: Write>(writer: &mut W, rows: &[Row]) -> Result<()> {
    writeln!(writer, "BY TAG")?;
    writeln!(writer, "──────")?;
    let max = rows.iter().map(row_minutes).max().unwrap_or(0);
    for row in rows {
        writeln!(
            writer,
            "{:<24} {:>7}  {}",
            row.label,
            row.value,
            progress_bar(row_minutes(row), max)
        )?;
    }
    Ok(())
}

/// Writes the human-readable report.
pub fn write_report<W: Write>(writer: &mut W, analytics: &Analytics) -> Result<()> {
    if analytics.day.is_empty() {
        writeln!(writer, "No entries recorded.")?;
        return Ok(());
    }

    write_section(writer, "DAYS", &analytics.day)?;
    writeln!(writer)?;
    write_section(writer, "WEEKS", &analytics.week)?;
    writeln!(writer)?;
    write_section(writer, "MONTHS", &analytics.month)?;
    writeln!(writer)?;
    write_tags(writer, &analytics.tags)?;
    Ok(())
}

pub async fn run<W: Write>(
    writer: &mut W,
    args: &AnalyticsArgs,
    tracker: &Tracker,
    config: &Config,
) -> Result<()> {
    let user_id = acting_user(config)?;
    let utc_offset = match args.offset {
        Some(offset) => check_utc_offset(offset)?,
        None => config.utc_offset()?,
    };
    let now = Utc::now();
    let at = match &args.at {
        Some(at) => parse_timestamp(at, now)?,
        None => now.timestamp(),
    };

    let analytics = tracker.analytics_at(user_id, utc_offset, at).await?;
    tracing::debug!(%user_id, utc_offset, at, "computed analytics");

    if args.json {
        serde_json::to_writer_pretty(&mut *writer, &analytics)?;
        writeln!(writer)?;
    } else {
        write_report(writer, &analytics)?;
    }
    Ok(())
}
