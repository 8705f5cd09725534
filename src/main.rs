use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use vectorizer::cli::commands::{handle_init, handle_run, handle_status};
use vectorizer::cli::{Cli, Commands, env_file_from_args};
use vectorizer::error::ConfigError;
use vectorizer::models::OutputFormat;

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file(env_file_from_args(std::env::args()).as_deref())?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("Received shutdown signal, stopping after in-flight batches");
        signal_cancel.cancel();
    });

    run_command(cli.command, cli.format, cancel).await
}

/// Load variables from an explicit env file, or from `./.env` when present.
/// Variables already set in the process environment win.
fn load_env_file(path: Option<&Path>) -> Result<(), ConfigError> {
    match path {
        Some(path) => dotenvy::from_path(path)
            .map_err(|e| ConfigError::EnvFile(format!("{}: {}", path.display(), e))),
        None => {
            dotenvy::dotenv().ok();
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "vectorizer=debug,info"
    } else {
        "vectorizer=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

async fn run_command(
    command: Commands,
    format: OutputFormat,
    cancel: CancellationToken,
) -> Result<()> {
    match command {
        Commands::Run(args) => handle_run(args, format, cancel).await?,
        Commands::Status(args) => handle_status(args, format).await?,
        Commands::Init(args) => handle_init(args, format).await?,
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
