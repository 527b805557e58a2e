//! User command.

use std::io::Write;

use anyhow::Result;
use clap::Subcommand;

use tm_tracker::Tracker;

#[derive(Debug, Subcommand)]
pub enum UserAction {
    /// Create a user with the default "No Project" tag.
    Create,
}

pub async fn run<W: Write>(writer: &mut W, action: &UserAction, tracker: &Tracker) -> Result<()> {
    match action {
        UserAction::Create => {
            let user_id = tracker.create_user().await?;
            writeln!(writer, "Created user {user_id}")?;
            writeln!(
                writer,
                "Act as this user with --user {user_id} or TM_USER_ID={user_id}"
            )?;
        }
    }
    Ok(())
}
