//! Interval time tracker CLI library.
//!
//! This crate provides the `tm` command-line interface over `tm-tracker`.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::Config;
