//! Running entry commands.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::Utc;
use clap::Subcommand;

use tm_core::{NewRunningEntry, StartOutcome, StopOutcome, TagId, format_hhmm};
use tm_tracker::Tracker;

use super::util::{
    acting_user, describe_entry, format_time, overlap_message, parse_timestamp, tag_or_default,
};
use crate::Config;

#[derive(Debug, Subcommand)]
pub enum RunningAction {
    /// Show the running entry.
    Show,
    /// Start tracking, replacing any running entry.
    Start {
        name: String,
        /// Start time. Defaults to now.
        #[arg(long)]
        start: Option<String>,
        /// Tag ID. Defaults to the user's first tag.
        #[arg(long)]
        tag: Option<TagId>,
    },
    /// Stop tracking and commit the interval.
    Stop {
        /// End time. Defaults to now.
        #[arg(long)]
        end: Option<String>,
    },
    /// Throw the running entry away without committing it.
    Discard,
}

pub async fn run<W: Write>(
    writer: &mut W,
    action: &RunningAction,
    tracker: &Tracker,
    config: &Config,
) -> Result<()> {
    let user_id = acting_user(config)?;
    let utc_offset = config.utc_offset()?;
    let now = Utc::now();

    match action {
        RunningAction::Show => match tracker.running_entry(user_id).await? {
            Some(running) => writeln!(
                writer,
                "Running: {} since {} ({} elapsed)",
                running.name,
                format_time(running.start_time_utc, utc_offset),
                format_hhmm(now.timestamp().saturating_sub(running.start_time_utc))
            )?,
            None => writeln!(writer, "Nothing running.")?,
        },
        RunningAction::Start { name, start, tag } => {
            let start_time_utc = match start {
                Some(start) => parse_timestamp(start, now)?,
                None => now.timestamp(),
            };
            let entry = NewRunningEntry {
                name: name.clone(),
                start_time_utc,
                tag_id: tag_or_default(tracker, user_id, *tag).await?,
            };
            match tracker.start_running(user_id, entry).await? {
                StartOutcome::Started(running) => writeln!(
                    writer,
                    "Started {} at {}",
                    running.name,
                    format_time(running.start_time_utc, utc_offset)
                )?,
                StartOutcome::UnknownTag(tag_id) => bail!("tag not found: {tag_id}"),
                StartOutcome::Invalid(err) => return Err(err.into()),
            }
        }
        RunningAction::Stop { end } => {
            let end_time_utc = match end {
                Some(end) => parse_timestamp(end, now)?,
                None => now.timestamp(),
            };
            match tracker.stop_running(user_id, end_time_utc).await? {
                StopOutcome::Committed(entry) => writeln!(
                    writer,
                    "Stopped entry {}: {}",
                    entry.id,
                    describe_entry(&entry, utc_offset)
                )?,
                StopOutcome::Conflict(existing) => {
                    tracing::warn!(existing = %existing.id, "rejected overlapping stop");
                    bail!(
                        "cannot stop: interval {}. The entry is still running",
                        overlap_message(&existing, utc_offset)
                    )
                }
                StopOutcome::NotRunning => bail!("nothing is running"),
                StopOutcome::EmptyInterval {
                    start_time_utc,
                    end_time_utc,
                } => bail!(
                    "cannot stop: end {} is not after start {}",
                    format_time(end_time_utc, utc_offset),
                    format_time(start_time_utc, utc_offset)
                ),
                StopOutcome::Invalid(err) => bail!("cannot stop: {err}"),
            }
        }
        RunningAction::Discard => {
            if tracker.discard_running(user_id).await? {
                writeln!(writer, "Discarded running entry.")?;
            } else {
                writeln!(writer, "Nothing running.")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    use crate::commands::util::testing::{WED_MIDNIGHT, setup};

    fn start(name: &str, at: i64) -> RunningAction {
        RunningAction::Start {
            name: name.to_string(),
            start: Some(at.to_string()),
            tag: None,
        }
    }

    fn stop(at: i64) -> RunningAction {
        RunningAction::Stop {
            end: Some(at.to_string()),
        }
    }

    #[tokio::test]
    async fn start_then_stop_commits() {
        let (_temp, tracker, config, user) = setup().await;
        let mut output = Vec::new();

        run(&mut output, &start("Writing", WED_MIDNIGHT), &tracker, &config)
            .await
            .unwrap();
        run(&mut output, &stop(WED_MIDNIGHT + 5_400), &tracker, &config)
            .await
            .unwrap();
        run(&mut output, &RunningAction::Show, &tracker, &config)
            .await
            .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Started Writing at 2024-01-17 00:00
        Stopped entry 1: 2024-01-17 00:00 - 2024-01-17 01:30 (01:30) Writing
        Nothing running.
        ");
        assert_eq!(tracker.list_entries(user, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stop_into_existing_entry_keeps_running() {
        let (_temp, tracker, config, user) = setup().await;
        let tag = tracker.list_tags(user).await.unwrap()[0].id;
        tracker
            .create_entry(
                user,
                tm_core::NewEntry {
                    name: "Meeting".to_string(),
                    start_time_utc: WED_MIDNIGHT + 3_600,
                    end_time_utc: WED_MIDNIGHT + 7_200,
                    tag_id: tag,
                },
            )
            .await
            .unwrap();
        let mut output = Vec::new();
        run(&mut output, &start("Focus", WED_MIDNIGHT), &tracker, &config)
            .await
            .unwrap();

        let err = run(&mut output, &stop(WED_MIDNIGHT + 5_400), &tracker, &config)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot stop: interval overlaps with \"Meeting\" (2024-01-17 01:00 - 2024-01-17 02:00). The entry is still running"
        );
        assert!(tracker.running_entry(user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stop_before_start_is_rejected() {
        let (_temp, tracker, config, _user) = setup().await;
        let mut output = Vec::new();
        run(&mut output, &start("Focus", WED_MIDNIGHT), &tracker, &config)
            .await
            .unwrap();

        let err = run(&mut output, &stop(WED_MIDNIGHT - 60), &tracker, &config)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot stop: end 2024-01-16 23:59 is not after start 2024-01-17 00:00"
        );
    }

    #[tokio::test]
    async fn stop_without_running_entry_fails() {
        let (_temp, tracker, config, _user) = setup().await;
        let mut output = Vec::new();

        let err = run(&mut output, &stop(WED_MIDNIGHT), &tracker, &config)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "nothing is running");
    }

    #[tokio::test]
    async fn discard_reports_whether_anything_ran() {
        let (_temp, tracker, config, _user) = setup().await;
        let mut output = Vec::new();

        run(&mut output, &RunningAction::Discard, &tracker, &config)
            .await
            .unwrap();
        run(&mut output, &start("Oops", WED_MIDNIGHT), &tracker, &config)
            .await
            .unwrap();
        run(&mut output, &RunningAction::Discard, &tracker, &config)
            .await
            .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Nothing running.
        Started Oops at 2024-01-17 00:00
        Discarded running entry.
        ");
    }

    #[tokio::test]
    async fn start_with_foreign_tag_fails() {
        let (_temp, tracker, config, _user) = setup().await;
        let other = tracker.create_user().await.unwrap();
        let foreign = tracker.list_tags(other).await.unwrap()[0].id;
        let mut output = Vec::new();

        let err = run(
            &mut output,
            &RunningAction::Start {
                name: "Sneaky".to_string(),
                start: None,
                tag: Some(foreign),
            },
            &tracker,
            &config,
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), format!("tag not found: {foreign}"));
    }
}
