//! CLI subcommand implementations.

pub mod analytics;
pub mod entry;
pub mod running;
pub mod status;
pub mod tag;
pub mod transfer;
pub mod user;
pub mod util;

use std::io::Write;

use anyhow::Result;

use tm_tracker::Tracker;

use crate::{Commands, Config};

/// Runs one subcommand against an open tracker.
pub async fn dispatch<W: Write>(
    writer: &mut W,
    command: &Commands,
    tracker: &Tracker,
    config: &Config,
) -> Result<()> {
    match command {
        Commands::User(action) => user::run(writer, action, tracker).await,
        Commands::Tag(action) => tag::run(writer, action, tracker, config).await,
        Commands::Entry(action) => entry::run(writer, action, tracker, config).await,
        Commands::Running(action) => running::run(writer, action, tracker, config).await,
        Commands::Analytics(args) => analytics::run(writer, args, tracker, config).await,
        Commands::Export => transfer::export(writer, tracker, config).await,
        Commands::Import(args) => transfer::import(writer, args, tracker, config).await,
        Commands::Status => status::run(writer, tracker, config).await,
    }
}
