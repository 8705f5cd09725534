//! Orchestrator: page pending rows into the queue and drain each page with a
//! fixed pool of workers until the store reports nothing left.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::models::EmbeddingConfiguration;
use crate::services::embedding::EmbeddingProvider;
use crate::services::progress::{NoopProgress, ProgressReporter};
use crate::services::queue::WorkQueue;
use crate::services::storage::EmbeddingStore;
use crate::services::worker::{Worker, WorkerContext, WorkerStats};
use crate::utils::retry::RetryPolicy;

/// Tracing target for the page loop.
const TRACING_TARGET: &str = "vectorizer::pipeline";

/// Fixed sizing of a run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Rows loaded per page.
    pub page_size: usize,
    /// Workers started per page.
    pub worker_count: usize,
    /// Maximum texts per provider request.
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub total_pending: u64,
    pub rows_completed: u64,
    pub chunks_embedded: u64,
    pub pages: u64,
    pub provider_calls: u64,
    pub throttled_retries: u64,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct Pipeline {
    store: Arc<dyn EmbeddingStore>,
    providers: Vec<Arc<dyn EmbeddingProvider>>,
    progress: Arc<dyn ProgressReporter>,
    embedding: EmbeddingConfiguration,
    options: PipelineOptions,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn EmbeddingStore>,
        providers: Vec<Arc<dyn EmbeddingProvider>>,
        embedding: EmbeddingConfiguration,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            providers,
            progress: Arc::new(NoopProgress),
            embedding,
            options,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Use an externally owned token, e.g. one cancelled on Ctrl-C.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run until every pending row has been embedded.
    ///
    /// The first worker failure stops the run before another page is loaded.
    /// Embeddings saved before the failure stay in place; a rerun resumes from
    /// the remaining pending rows.
    pub async fn run(&self) -> Result<RunStats, PipelineError> {
        if self.providers.is_empty() {
            return Err(PipelineError::NoProviders);
        }

        let started = Instant::now();
        let started_at = Utc::now();

        let total_pending = self.store.count().await?;
        self.progress.on_total_known(total_pending);
        tracing::info!(target: TRACING_TARGET, total_pending, "Rows to process");

        let queue = Arc::new(WorkQueue::new());
        let mut stats = WorkerStats::default();
        let mut pages = 0u64;

        let result = loop {
            if self.cancel.is_cancelled() {
                break Err(PipelineError::Cancelled);
            }

            let loaded = match self.store.load_page(self.options.page_size, &queue).await {
                Ok(loaded) => loaded,
                Err(err) => break Err(err.into()),
            };

            if loaded == 0 {
                tracing::info!(target: TRACING_TARGET, "No more rows to process");
                break Ok(());
            }

            pages += 1;
            self.progress.on_page_loaded(loaded);
            tracing::info!(target: TRACING_TARGET, page = pages, rows = loaded, "Loaded page");

            match self.drain_page(&queue).await {
                Ok(page_stats) => stats.merge(page_stats),
                Err(err) => break Err(err),
            }
        };

        self.progress.finish();
        result?;

        Ok(RunStats {
            total_pending,
            rows_completed: stats.rows_completed,
            chunks_embedded: stats.chunks_embedded,
            pages,
            provider_calls: stats.provider_calls,
            throttled_retries: stats.throttled_retries,
            duration_ms: started.elapsed().as_millis() as u64,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Start the worker pool on the loaded page and wait for all of it.
    async fn drain_page(&self, queue: &Arc<WorkQueue>) -> Result<WorkerStats, PipelineError> {
        let page_cancel = self.cancel.child_token();
        let ctx = Arc::new(WorkerContext {
            queue: Arc::clone(queue),
            store: Arc::clone(&self.store),
            progress: Arc::clone(&self.progress),
            embedding: self.embedding,
            batch_size: self.options.batch_size.max(1),
            retry: self.options.retry.clone(),
            cancel: page_cancel.clone(),
        });

        let mut workers = JoinSet::new();
        for id in 0..self.options.worker_count.max(1) {
            // Static round-robin over the configured endpoints.
            let provider = Arc::clone(&self.providers[id % self.providers.len()]);
            workers.spawn(Worker::new(id, provider, Arc::clone(&ctx)).run());
        }

        let mut stats = WorkerStats::default();
        let mut first_error = None;

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(worker_stats)) => stats.merge(worker_stats),
                Ok(Err(err)) => {
                    page_cancel.cancel();
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    page_cancel.cancel();
                    first_error.get_or_insert(PipelineError::WorkerPanicked(join_err.to_string()));
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        if page_cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        Ok(stats)
    }
}
