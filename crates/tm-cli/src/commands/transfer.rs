//! Export and import of entries as JSON Lines.
//!
//! Each line is one [`ExportRecord`]: name, start and end in Unix seconds, and
//! the tag by name and color. IDs are not carried, so an export from one user
//! or database imports cleanly into another.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use tm_core::ExportRecord;
use tm_tracker::Tracker;

use super::util::acting_user;
use crate::Config;

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// JSON Lines file to read. Reads stdin when omitted.
    pub file: Option<PathBuf>,
}

pub async fn export<W: Write>(writer: &mut W, tracker: &Tracker, config: &Config) -> Result<()> {
    let user_id = acting_user(config)?;
    let records = tracker.export(user_id).await?;
    for record in &records {
        serde_json::to_writer(&mut *writer, record).context("failed to serialize entry")?;
        writeln!(writer)?;
    }
    tracing::debug!(%user_id, count = records.len(), "exported entries");
    Ok(())
}

pub async fn import<W: Write>(
    writer: &mut W,
    args: &ImportArgs,
    tracker: &Tracker,
    config: &Config,
) -> Result<()> {
    let records = match &args.file {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            parse_records(BufReader::new(file))?
        }
        None => parse_records(io::stdin().lock())?,
    };
    import_records(writer, records, tracker, config).await
}

async fn import_records<W: Write>(
    writer: &mut W,
    records: Vec<ExportRecord>,
    tracker: &Tracker,
    config: &Config,
) -> Result<()> {
    let user_id = acting_user(config)?;
    let summary = tracker.import(user_id, records).await?;

    writeln!(
        writer,
        "Imported {} entries, created {} tags.",
        summary.entries_created, summary.tags_created
    )?;
    for error in &summary.errors {
        tracing::warn!(%user_id, error = %error, "skipped record");
        writeln!(writer, "  skipped: {error}")?;
    }
    Ok(())
}

fn parse_records<R: BufRead>(reader: R) -> Result<Vec<ExportRecord>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: ExportRecord = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON on line {}", idx + 1))?;
        records.push(record);
    }
    Ok(records)
}
