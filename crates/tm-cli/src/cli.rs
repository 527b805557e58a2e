//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use tm_core::UserId;

use crate::commands::analytics::AnalyticsArgs;
use crate::commands::entry::EntryAction;
use crate::commands::running::RunningAction;
use crate::commands::tag::TagAction;
use crate::commands::transfer::ImportArgs;
use crate::commands::user::UserAction;

/// Interval time tracker.
///
/// Records named, tagged time intervals that never overlap, keeps at most one
/// running entry, and rolls history up into day, week, month, and tag totals.
#[derive(Debug, Parser)]
#[command(name = "tm", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Act as this user, overriding the configured one.
    #[arg(short, long, global = true)]
    pub user: Option<UserId>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage users.
    #[command(subcommand)]
    User(UserAction),

    /// Manage tags.
    #[command(subcommand)]
    Tag(TagAction),

    /// Manage committed entries.
    #[command(subcommand)]
    Entry(EntryAction),

    /// Manage the running entry.
    #[command(subcommand)]
    Running(RunningAction),

    /// Show time per day, week, month, and tag.
    Analytics(AnalyticsArgs),

    /// Write all entries as JSON Lines to stdout.
    Export,

    /// Import entries from JSON Lines.
    Import(ImportArgs),

    /// Show current tracking status.
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_user_after_subcommand() {
        let cli = Cli::try_parse_from(["tm", "entry", "list", "--all", "-u", "3"]).unwrap();
        assert_eq!(cli.user, Some(UserId::new(3)));
        assert!(matches!(
            cli.command,
            Some(Commands::Entry(EntryAction::List { all: true, json: false }))
        ));
    }

    #[test]
    fn negative_offsets_parse() {
        let cli = Cli::try_parse_from(["tm", "analytics", "--offset", "-7200"]).unwrap();
        let Some(Commands::Analytics(args)) = cli.command else {
            panic!("expected analytics command");
        };
        assert_eq!(args.offset, Some(-7_200));
    }

    #[test]
    fn rejects_out_of_range_offsets() {
        let err = Cli::try_parse_from(["tm", "analytics", "--offset", "-9223372036854775808"])
            .unwrap_err();
        assert!(err.to_string().contains("UTC offset -9223372036854775808 is out of range"));
        assert!(Cli::try_parse_from(["tm", "analytics", "--offset", "50401"]).is_err());
    }

    #[test]
    fn rejects_unknown_color() {
        let err = Cli::try_parse_from(["tm", "tag", "add", "Work", "--color", "purple"]).unwrap_err();
        assert!(err.to_string().contains("unknown color: purple"));
    }
}
