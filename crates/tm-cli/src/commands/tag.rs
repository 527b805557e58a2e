//! Tag commands: list, add, and edit a user's tags.

use std::io::Write;

use anyhow::{Result, bail};
use clap::Subcommand;

use tm_core::{Color, NewTag, Tag, TagId, TagOutcome, TagPatch};
use tm_tracker::Tracker;

use super::util::acting_user;
use crate::Config;

#[derive(Debug, Subcommand)]
pub enum TagAction {
    /// List tags.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Create a tag.
    Add {
        name: String,
        /// Palette color (slate, red, amber, lime, emerald, cyan, blue, violet, fuchsia).
        #[arg(long)]
        color: Option<Color>,
    },
    /// Rename or recolor a tag.
    Edit {
        id: TagId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<Color>,
    },
}

fn write_tag<W: Write>(writer: &mut W, tag: &Tag) -> Result<()> {
    writeln!(
        writer,
        "{:>4}  {:<8} {}",
        tag.id.get(),
        tag.color.as_str(),
        tag.name
    )?;
    Ok(())
}

fn non_empty(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        bail!("tag name cannot be empty");
    }
    Ok(name.to_string())
}

pub async fn run<W: Write>(
    writer: &mut W,
    action: &TagAction,
    tracker: &Tracker,
    config: &Config,
) -> Result<()> {
    let user_id = acting_user(config)?;

    match action {
        TagAction::List { json } => {
            let tags = tracker.list_tags(user_id).await?;
            if *json {
                serde_json::to_writer_pretty(&mut *writer, &tags)?;
                writeln!(writer)?;
                return Ok(());
            }
            if tags.is_empty() {
                writeln!(writer, "No tags.")?;
                return Ok(());
            }
            for tag in &tags {
                write_tag(writer, tag)?;
            }
        }
        TagAction::Add { name, color } => {
            let tag = NewTag {
                name: non_empty(name)?,
                color: *color,
            };
            let tag = tracker.create_tag(user_id, tag).await?;
            writeln!(writer, "Created tag {}: {} ({})", tag.id, tag.name, tag.color)?;
        }
        TagAction::Edit { id, name, color } => {
            if name.is_none() && color.is_none() {
                bail!("nothing to change. Pass --name and/or --color");
            }
            let patch = TagPatch {
                name: name.as_deref().map(non_empty).transpose()?,
                color: *color,
            };
            match tracker.update_tag(user_id, *id, patch).await? {
                TagOutcome::Updated(tag) => {
                    writeln!(writer, "Updated tag {}: {} ({})", tag.id, tag.name, tag.color)?;
                }
                TagOutcome::NotFound => bail!("tag not found: {id}"),
            }
        }
    }
    Ok(())
}
