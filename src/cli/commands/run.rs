use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{RunSummary, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::{
    ConsoleProgress, EmbeddingClient, EmbeddingProvider, EmbeddingStore, Pipeline,
    PipelineOptions, ProgressReporter, create_store,
};

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: Config,
}

pub async fn handle_run(
    args: RunArgs,
    format: OutputFormat,
    cancel: CancellationToken,
) -> Result<()> {
    let config = args.config;
    config.validate()?;

    let embedding = config.embedding_configuration();
    if config.pipeline.chunk_text && !config.storage.is_dedicated() {
        tracing::warn!("Chunking requires a dedicated table; embedding the first fragment per row");
    }

    let clients = EmbeddingClient::from_config(&config.embedding)?;
    let worker_count = config.pipeline.worker_count(clients.len());
    let endpoints = clients.len();

    let store: Arc<dyn EmbeddingStore> =
        Arc::from(create_store(&config.storage, embedding.dimensions)?);

    tracing::info!(
        table = %config.storage.table_name,
        layout = %store.variant(),
        target = %store.target(),
        "Storage configured"
    );
    tracing::info!(
        provider = %config.embedding.provider,
        model = %config.embedding.model,
        dimensions = embedding.dimensions,
        endpoints,
        "Embedding provider configured"
    );
    tracing::info!(
        workers = worker_count,
        page_size = config.pipeline.page_size,
        batch_size = config.embedding.batch_size,
        chunk_text = embedding.chunk_text,
        chunk_max_length = embedding.chunk_max_length,
        "Pipeline configured"
    );

    store
        .test_connection()
        .await
        .context("Failed to connect to PostgreSQL")?;
    store
        .initialize_database()
        .await
        .context("Failed to initialize storage")?;

    let progress: Arc<dyn ProgressReporter> = match format {
        OutputFormat::Json => Arc::new(ConsoleProgress::hidden()),
        OutputFormat::Text => Arc::new(ConsoleProgress::new()),
    };

    let providers: Vec<Arc<dyn EmbeddingProvider>> = clients
        .into_iter()
        .map(|client| Arc::new(client) as Arc<dyn EmbeddingProvider>)
        .collect();

    let options = PipelineOptions {
        page_size: config.pipeline.page_size,
        worker_count,
        batch_size: config.embedding.batch_size,
        retry: config.pipeline.retry_policy(),
    };

    let stats = Pipeline::new(Arc::clone(&store), providers, embedding, options)
        .with_progress(progress)
        .with_cancellation(cancel)
        .run()
        .await
        .context("Vectorization aborted")?;

    tracing::info!(
        rows = stats.rows_completed,
        chunks = stats.chunks_embedded,
        duration_ms = stats.duration_ms,
        "Vectorization finished"
    );

    let summary = RunSummary {
        variant: store.variant(),
        target: store.target(),
        model: config.embedding.model.clone(),
        endpoints,
        workers: worker_count,
        stats,
    };
    print!("{}", get_formatter(format).format_run_summary(&summary));

    Ok(())
}
