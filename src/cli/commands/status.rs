use anyhow::Result;
use clap::Args;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::create_store;

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub config: Config,
}

pub async fn handle_status(args: StatusArgs, format: OutputFormat) -> Result<()> {
    let config = args.config;
    config.storage.validate()?;

    let formatter = get_formatter(format);
    let store = create_store(&config.storage, config.embedding.dimensions)?;

    let (connected, pending_rows, error) = match store.test_connection().await {
        Ok(()) => match store.count().await {
            Ok(pending) => (true, Some(pending), None),
            Err(err) => (true, None, Some(err.to_string())),
        },
        Err(err) => (false, None, Some(err.to_string())),
    };

    let status = StatusInfo {
        variant: store.variant(),
        target: store.target(),
        connected,
        pending_rows,
        error,
    };

    print!("{}", formatter.format_status(&status));

    if !connected {
        eprintln!();
        eprintln!("Warning: PostgreSQL not accessible. Check DATABASE_URL.");
    } else if pending_rows.is_none() {
        eprintln!();
        eprintln!("Hint: run `vectorizer init` to verify or create the storage tables.");
    }

    Ok(())
}
