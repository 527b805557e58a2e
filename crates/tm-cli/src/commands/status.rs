//! Status command: acting user, database, running entry, and today's total.

use std::io::Write;

use anyhow::Result;

use tm_tracker::Tracker;

use super::util::{acting_user, format_time};
use crate::Config;

pub async fn run<W: Write>(writer: &mut W, tracker: &Tracker, config: &Config) -> Result<()> {
    let user_id = acting_user(config)?;
    let utc_offset = config.utc_offset()?;

    writeln!(writer, "timeops status")?;
    writeln!(writer, "User: {user_id}")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;

    match tracker.running_entry(user_id).await? {
        Some(running) => writeln!(
            writer,
            "Running: {} since {}",
            running.name,
            format_time(running.start_time_utc, utc_offset)
        )?,
        None => writeln!(writer, "Running: nothing")?,
    }

    let analytics = tracker.analytics(user_id, utc_offset).await?;
    let today = analytics.day.first().map_or("00:00", |row| row.value.as_str());
    writeln!(writer, "Today: {today}")?;

    Ok(())
}
