//! Entry commands for committed intervals.

use std::collections::HashMap;
use std::io::Write;

use anyhow::{Result, bail};
use chrono::Utc;
use clap::Subcommand;

use tm_core::{Entry, EntryId, EntryOutcome, EntryPatch, NewEntry, TagId};
use tm_tracker::Tracker;

use super::util::{acting_user, describe_entry, overlap_message, parse_timestamp, tag_or_default};
use crate::Config;

#[derive(Debug, Subcommand)]
pub enum EntryAction {
    /// Record a finished interval.
    Add {
        name: String,
        /// Start time (Unix seconds, RFC 3339, or e.g. "2 hours ago").
        #[arg(long)]
        start: String,
        /// End time, exclusive.
        #[arg(long)]
        end: String,
        /// Tag ID. Defaults to the user's first tag.
        #[arg(long)]
        tag: Option<TagId>,
    },
    /// Change fields of an existing entry.
    Edit {
        id: EntryId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        tag: Option<TagId>,
    },
    /// List entries, newest first.
    List {
        /// Include entries older than the configured window.
        #[arg(long)]
        all: bool,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete every entry.
    Clear,
}

/// Unwraps an accepted write or turns the rejection into an error.
fn accepted(outcome: EntryOutcome, utc_offset: i64) -> Result<Entry> {
    match outcome {
        EntryOutcome::Accepted(entry) => Ok(entry),
        EntryOutcome::Conflict(existing) => {
            tracing::warn!(existing = %existing.id, "rejected overlapping entry");
            bail!("entry {}", overlap_message(&existing, utc_offset))
        }
        EntryOutcome::NotFound => bail!("entry not found"),
        EntryOutcome::UnknownTag(tag_id) => bail!("tag not found: {tag_id}"),
        EntryOutcome::Invalid(err) => Err(err.into()),
    }
}

pub async fn run<W: Write>(
    writer: &mut W,
    action: &EntryAction,
    tracker: &Tracker,
    config: &Config,
) -> Result<()> {
    let user_id = acting_user(config)?;
    let utc_offset = config.utc_offset()?;
    let now = Utc::now();

    match action {
        EntryAction::Add {
            name,
            start,
            end,
            tag,
        } => {
            let entry = NewEntry {
                name: name.clone(),
                start_time_utc: parse_timestamp(start, now)?,
                end_time_utc: parse_timestamp(end, now)?,
                tag_id: tag_or_default(tracker, user_id, *tag).await?,
            };
            let entry = accepted(tracker.create_entry(user_id, entry).await?, utc_offset)?;
            writeln!(
                writer,
                "Added entry {}: {}",
                entry.id,
                describe_entry(&entry, utc_offset)
            )?;
        }
        EntryAction::Edit {
            id,
            name,
            start,
            end,
            tag,
        } => {
            let patch = EntryPatch {
                name: name.clone(),
                start_time_utc: start.as_deref().map(|s| parse_timestamp(s, now)).transpose()?,
                end_time_utc: end.as_deref().map(|s| parse_timestamp(s, now)).transpose()?,
                tag_id: *tag,
            };
            let outcome = tracker.update_entry(user_id, *id, patch).await?;
            if outcome == EntryOutcome::NotFound {
                bail!("entry not found: {id}");
            }
            let entry = accepted(outcome, utc_offset)?;
            writeln!(
                writer,
                "Updated entry {}: {}",
                entry.id,
                describe_entry(&entry, utc_offset)
            )?;
        }
        EntryAction::List { all, json } => {
            let since = (!*all).then(|| config.list_since(now.timestamp()));
            let entries = tracker.list_entries(user_id, since).await?;
            if *json {
                serde_json::to_writer_pretty(&mut *writer, &entries)?;
                writeln!(writer)?;
                return Ok(());
            }
            if entries.is_empty() {
                writeln!(writer, "No entries.")?;
                return Ok(());
            }

            let tag_names: HashMap<TagId, String> = tracker
                .list_tags(user_id)
                .await?
                .into_iter()
                .map(|tag| (tag.id, tag.name))
                .collect();
            for entry in &entries {
                let tag = tag_names.get(&entry.tag_id).map_or("?", String::as_str);
                writeln!(
                    writer,
                    "{:>4}  {}  [{tag}]",
                    entry.id.get(),
                    describe_entry(entry, utc_offset)
                )?;
            }
        }
        EntryAction::Clear => {
            let deleted = tracker.delete_all_entries(user_id).await?;
            writeln!(writer, "Deleted {deleted} entries.")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    use crate::commands::util::testing::{WED_MIDNIGHT, setup};

    fn add(name: &str, start: i64, end: i64) -> EntryAction {
        EntryAction::Add {
            name: name.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            tag: None,
        }
    }

    #[tokio::test]
    async fn add_and_list_all() {
        let (_temp, tracker, config, _user) = setup().await;
        let mut output = Vec::new();

        run(&mut output, &add("Standup", WED_MIDNIGHT + 9 * 3_600, WED_MIDNIGHT + 9 * 3_600 + 900), &tracker, &config)
            .await
            .unwrap();
        run(
            &mut output,
            &EntryAction::Add {
                name: "Review".to_string(),
                start: "2024-01-17T10:00:00Z".to_string(),
                end: "2024-01-17T11:30:00Z".to_string(),
                tag: None,
            },
            &tracker,
            &config,
        )
        .await
        .unwrap();
        run(
            &mut output,
            &EntryAction::List {
                all: true,
                json: false,
            },
            &tracker,
            &config,
        )
        .await
        .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Added entry 1: 2024-01-17 09:00 - 2024-01-17 09:15 (00:15) Standup
        Added entry 2: 2024-01-17 10:00 - 2024-01-17 11:30 (01:30) Review
           2  2024-01-17 10:00 - 2024-01-17 11:30 (01:30) Review  [No Project]
           1  2024-01-17 09:00 - 2024-01-17 09:15 (00:15) Standup  [No Project]
        ");
    }

    #[tokio::test]
    async fn overlapping_add_is_rejected() {
        let (_temp, tracker, config, user) = setup().await;
        let mut output = Vec::new();
        run(&mut output, &add("Standup", WED_MIDNIGHT, WED_MIDNIGHT + 3_600), &tracker, &config)
            .await
            .unwrap();

        let err = run(
            &mut output,
            &add("Clash", WED_MIDNIGHT + 1_800, WED_MIDNIGHT + 5_400),
            &tracker,
            &config,
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "entry overlaps with \"Standup\" (2024-01-17 00:00 - 2024-01-17 01:00)"
        );
        assert_eq!(tracker.list_entries(user, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_interval_is_rejected() {
        let (_temp, tracker, config, _user) = setup().await;
        let mut output = Vec::new();

        let err = run(&mut output, &add("Nothing", WED_MIDNIGHT, WED_MIDNIGHT), &tracker, &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must be after start time"));
    }

    #[tokio::test]
    async fn edit_moves_entry() {
        let (_temp, tracker, config, _user) = setup().await;
        let mut output = Vec::new();
        run(&mut output, &add("Focus", WED_MIDNIGHT, WED_MIDNIGHT + 3_600), &tracker, &config)
            .await
            .unwrap();
        output.clear();

        run(
            &mut output,
            &EntryAction::Edit {
                id: EntryId::new(1),
                name: None,
                start: None,
                end: Some((WED_MIDNIGHT + 7_200).to_string()),
                tag: None,
            },
            &tracker,
            &config,
        )
        .await
        .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @"Updated entry 1: 2024-01-17 00:00 - 2024-01-17 02:00 (02:00) Focus");
    }

    #[tokio::test]
    async fn edit_missing_entry_fails() {
        let (_temp, tracker, config, _user) = setup().await;
        let mut output = Vec::new();

        let err = run(
            &mut output,
            &EntryAction::Edit {
                id: EntryId::new(42),
                name: Some("Ghost".to_string()),
                start: None,
                end: None,
                tag: None,
            },
            &tracker,
            &config,
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "entry not found: 42");
    }

    #[tokio::test]
    async fn list_json_and_clear() {
        let (_temp, tracker, config, _user) = setup().await;
        let mut output = Vec::new();
        run(&mut output, &add("A", WED_MIDNIGHT, WED_MIDNIGHT + 60), &tracker, &config)
            .await
            .unwrap();
        output.clear();

        run(
            &mut output,
            &EntryAction::List {
                all: true,
                json: true,
            },
            &tracker,
            &config,
        )
        .await
        .unwrap();
        let entries: Vec<Entry> = serde_json::from_slice(&output).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "A");

        output.clear();
        run(&mut output, &EntryAction::Clear, &tracker, &config)
            .await
            .unwrap();
        run(
            &mut output,
            &EntryAction::List {
                all: true,
                json: false,
            },
            &tracker,
            &config,
        )
        .await
        .unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Deleted 1 entries.
        No entries.
        ");
    }

    #[tokio::test]
    async fn default_list_hides_old_entries() {
        let (_temp, tracker, config, _user) = setup().await;
        let mut output = Vec::new();
        run(&mut output, &add("Ancient", WED_MIDNIGHT, WED_MIDNIGHT + 60), &tracker, &config)
            .await
            .unwrap();
        output.clear();

        run(
            &mut output,
            &EntryAction::List {
                all: false,
                json: false,
            },
            &tracker,
            &config,
        )
        .await
        .unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @"No entries.");
    }
}
