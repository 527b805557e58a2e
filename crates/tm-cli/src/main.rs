use std::io::Write;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use tm_cli::{Cli, Config, commands};
use tm_tracker::Tracker;

/// Open the tracker, ensuring the database directory exists.
fn open_tracker(config: &Config) -> Result<Tracker> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    Tracker::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so `tm export` output stays clean
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let mut config =
        Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(user) = cli.user {
        config.user_id = Some(user.get());
    }
    tracing::debug!(?config, "loaded configuration");

    let tracker = open_tracker(&config)?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;

    let mut stdout = std::io::stdout().lock();
    runtime.block_on(commands::dispatch(&mut stdout, command, &tracker, &config))?;
    stdout.flush()?;
    Ok(())
}
