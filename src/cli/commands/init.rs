use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::create_store;

#[derive(Debug, Args)]
pub struct InitArgs {
    #[command(flatten)]
    pub config: Config,
}

/// Verify the pgvector extension and storage objects, creating the dedicated
/// table when auto-create is enabled.
pub async fn handle_init(args: InitArgs, format: OutputFormat) -> Result<()> {
    let config = args.config;
    config.storage.validate()?;

    let store = create_store(&config.storage, config.embedding.dimensions)?;
    store
        .test_connection()
        .await
        .context("Failed to connect to PostgreSQL")?;
    store
        .initialize_database()
        .await
        .context("Failed to initialize storage")?;

    let message = format!("Storage ready: {} ({})", store.target(), store.variant());
    print!("{}", get_formatter(format).format_message(&message));

    Ok(())
}
