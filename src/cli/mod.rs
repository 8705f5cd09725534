//! CLI module for the table vectorizer.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Backfill a PostgreSQL vector column from a text column.
#[derive(Debug, Parser)]
#[command(name = "vectorizer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Environment file read before parsing (defaults to ./.env when present)
    #[arg(long = "env-file", global = true)]
    pub env_file: Option<PathBuf>,

    #[arg(
        long,
        short = 'f',
        global = true,
        default_value = "text",
        help = "Output format: text or json"
    )]
    pub format: OutputFormat,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Embed every pending row, then exit
    Run(commands::RunArgs),

    /// Show the storage layout and how many rows are pending
    Status(commands::StatusArgs),

    /// Verify or create the storage objects without embedding anything
    Init(commands::InitArgs),
}

/// Find the `--env-file` value in raw process arguments.
///
/// Flags bound to environment variables are resolved while parsing, so the
/// file has to be loaded before [`Cli::parse`] runs.
pub fn env_file_from_args<I>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--env-file" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--env-file=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}
