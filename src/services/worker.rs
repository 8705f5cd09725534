//! Batching engine.
//!
//! A [`Worker`] drains the shared page queue: it takes rows until it holds a
//! provider batch worth of chunks, sends provider-sized sub-batches with
//! throttling retries and writes each row through the store once all of its
//! chunks are embedded. Any other failure cancels the page so sibling workers
//! stop at their next loop boundary.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{EmbeddingError, PipelineError};
use crate::models::{ChunkedText, EmbeddingConfiguration};
use crate::services::chunker::TextChunker;
use crate::services::embedding::EmbeddingProvider;
use crate::services::progress::ProgressReporter;
use crate::services::queue::WorkQueue;
use crate::services::storage::EmbeddingStore;
use crate::utils::retry::{RetryPolicy, RetryResult, Retryable, with_retry};

/// Tracing target for worker activity.
const TRACING_TARGET: &str = "vectorizer::worker";

/// Everything the workers of one page share.
pub struct WorkerContext {
    pub queue: Arc<WorkQueue>,
    pub store: Arc<dyn EmbeddingStore>,
    pub progress: Arc<dyn ProgressReporter>,
    pub embedding: EmbeddingConfiguration,
    /// Maximum texts per provider request.
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub cancel: CancellationToken,
}

/// Counters collected by one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub rows_completed: u64,
    pub chunks_embedded: u64,
    pub provider_calls: u64,
    pub throttled_retries: u64,
}

impl WorkerStats {
    pub fn merge(&mut self, other: WorkerStats) {
        self.rows_completed += other.rows_completed;
        self.chunks_embedded += other.chunks_embedded;
        self.provider_calls += other.provider_calls;
        self.throttled_retries += other.throttled_retries;
    }
}

pub struct Worker {
    id: usize,
    provider: Arc<dyn EmbeddingProvider>,
    ctx: Arc<WorkerContext>,
    chunker: TextChunker,
}

impl Worker {
    pub fn new(id: usize, provider: Arc<dyn EmbeddingProvider>, ctx: Arc<WorkerContext>) -> Self {
        let chunker = TextChunker::new(&ctx.embedding);
        Self {
            id,
            provider,
            ctx,
            chunker,
        }
    }

    /// Drain the queue. On failure the shared token is cancelled before the
    /// error is returned.
    pub async fn run(self) -> Result<WorkerStats, PipelineError> {
        tracing::debug!(
            target: TRACING_TARGET,
            worker = self.id,
            endpoint = %self.provider.endpoint(),
            "Starting worker"
        );

        let mut stats = WorkerStats::default();
        match self.drain(&mut stats).await {
            Ok(()) => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    worker = self.id,
                    rows = stats.rows_completed,
                    chunks = stats.chunks_embedded,
                    "Worker finished"
                );
                Ok(stats)
            }
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    worker = self.id,
                    error = %err,
                    "Worker failed, cancelling page"
                );
                self.ctx.cancel.cancel();
                Err(err)
            }
        }
    }

    async fn drain(&self, stats: &mut WorkerStats) -> Result<(), PipelineError> {
        loop {
            if self.ctx.cancel.is_cancelled() {
                tracing::debug!(target: TRACING_TARGET, worker = self.id, "Cancellation observed");
                return Ok(());
            }

            let batch = self.next_batch();
            if batch.is_empty() {
                return Ok(());
            }

            self.process_batch(batch, stats).await?;
        }
    }

    /// Take rows until a provider batch worth of chunks is held or the queue is empty.
    fn next_batch(&self) -> Vec<ChunkedText> {
        let mut batch = Vec::new();
        while batch.len() < self.ctx.batch_size {
            let Some(row) = self.ctx.queue.take() else {
                break;
            };
            batch.extend(self.chunker.chunk_row(&row));
        }
        batch
    }

    /// Embed a batch and save each row once all of its chunks have vectors.
    ///
    /// Rows are written whole. On cancellation the vectors of unfinished rows
    /// are dropped, so those rows stay pending for the next run.
    async fn process_batch(
        &self,
        mut batch: Vec<ChunkedText>,
        stats: &mut WorkerStats,
    ) -> Result<(), PipelineError> {
        batch.sort_by_key(|c| (c.row_id, c.chunk_id));

        let mut expected: HashMap<i64, usize> = HashMap::new();
        for chunk in &batch {
            *expected.entry(chunk.row_id).or_default() += 1;
        }
        let mut buffered: HashMap<i64, Vec<(ChunkedText, Vec<f32>)>> = HashMap::new();

        // A row with many chunks can span several provider requests.
        for sub_batch in batch.chunks(self.ctx.batch_size.max(1)) {
            if self.ctx.cancel.is_cancelled() {
                self.discard_unfinished(&buffered);
                return Ok(());
            }

            let Some(embeddings) = self.embed_with_retry(sub_batch, stats).await? else {
                self.discard_unfinished(&buffered);
                return Ok(());
            };
            self.validate(sub_batch, &embeddings)?;

            for (chunk, embedding) in sub_batch.iter().zip(embeddings) {
                let row_id = chunk.row_id;
                let row = buffered.entry(row_id).or_default();
                row.push((chunk.clone(), embedding));

                if row.len() == expected.get(&row_id).copied().unwrap_or_default() {
                    if let Some(row) = buffered.remove(&row_id) {
                        self.save_row(row, stats).await?;
                    }
                }
            }
        }

        Ok(())
    }

    async fn save_row(
        &self,
        row: Vec<(ChunkedText, Vec<f32>)>,
        stats: &mut WorkerStats,
    ) -> Result<(), PipelineError> {
        let chunks = row.len() as u64;
        self.ctx.store.save_row(row).await?;

        stats.chunks_embedded += chunks;
        stats.rows_completed += 1;
        self.ctx.progress.on_row_completed();
        Ok(())
    }

    fn discard_unfinished(&self, buffered: &HashMap<i64, Vec<(ChunkedText, Vec<f32>)>>) {
        if !buffered.is_empty() {
            tracing::debug!(
                target: TRACING_TARGET,
                worker = self.id,
                rows = buffered.len(),
                "Cancelled mid-row, leaving rows pending"
            );
        }
    }

    /// Call the provider, retrying throttled attempts. `None` means the run
    /// was cancelled while waiting to retry.
    async fn embed_with_retry(
        &self,
        sub_batch: &[ChunkedText],
        stats: &mut WorkerStats,
    ) -> Result<Option<Vec<Vec<f32>>>, PipelineError> {
        let texts: Vec<String> = sub_batch.iter().map(|c| c.text.clone()).collect();
        let dimensions = self.ctx.embedding.dimensions;

        tracing::debug!(
            target: TRACING_TARGET,
            worker = self.id,
            chunks = texts.len(),
            dimensions,
            "Requesting embeddings"
        );

        let texts = texts.as_slice();
        let provider = self.provider.as_ref();
        let worker = self.id;

        let result = with_retry(&self.ctx.retry, &self.ctx.cancel, move |attempt| {
            async move {
                let result = provider.embed(texts, dimensions).await;
                if let Err(EmbeddingError::Throttled(message)) = &result {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        worker,
                        attempt,
                        %message,
                        "Throttled by embedding provider"
                    );
                }
                result
            }
        })
        .await;

        let attempts = result.attempts();
        stats.provider_calls += u64::from(attempts);
        stats.throttled_retries += u64::from(attempts.saturating_sub(1));

        match result {
            RetryResult::Success { value, .. } => Ok(Some(value)),
            RetryResult::Failed {
                last_error,
                attempts,
            } => {
                if last_error.is_retryable() {
                    Err(PipelineError::RetriesExhausted {
                        attempts,
                        source: last_error,
                    })
                } else {
                    Err(PipelineError::Embedding(last_error))
                }
            }
            RetryResult::Cancelled { .. } => Ok(None),
        }
    }

    /// Reject the whole sub-batch before anything reaches the store.
    fn validate(
        &self,
        sub_batch: &[ChunkedText],
        embeddings: &[Vec<f32>],
    ) -> Result<(), PipelineError> {
        if embeddings.len() != sub_batch.len() {
            return Err(PipelineError::ResponseLength {
                expected: sub_batch.len(),
                actual: embeddings.len(),
            });
        }

        let expected = self.ctx.embedding.dimensions;
        if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
            return Err(PipelineError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::models::{Row, StorageVariant};
    use crate::services::progress::NoopProgress;
    use crate::services::storage::memory::MemoryStore;
    use crate::services::testing::{StubProvider, passage};

    fn context(
        store: Arc<MemoryStore>,
        queue: Arc<WorkQueue>,
        batch_size: usize,
        chunk_max_length: usize,
    ) -> Arc<WorkerContext> {
        Arc::new(WorkerContext {
            queue,
            store,
            progress: Arc::new(NoopProgress),
            embedding: EmbeddingConfiguration {
                dimensions: 4,
                chunk_text: true,
                chunk_max_length,
            },
            batch_size,
            retry: RetryPolicy::new(3).with_delay(Duration::from_millis(1)),
            cancel: CancellationToken::new(),
        })
    }

    #[tokio::test]
    async fn test_long_row_split_across_requests() {
        let row = Row::new(1, passage(450));
        let queue = Arc::new(WorkQueue::new());
        queue.push(row.clone());
        let store = Arc::new(MemoryStore::new(
            StorageVariant::DedicatedTable,
            vec![row],
        ));
        let provider = Arc::new(StubProvider::new());

        let stats = Worker::new(0, provider.clone(), context(store.clone(), queue, 2, 100))
            .run()
            .await
            .unwrap();

        let sizes: Vec<usize> = provider.requests().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(stats.rows_completed, 1);
        assert_eq!(stats.chunks_embedded, 5);
        assert_eq!(stats.provider_calls, 3);

        let chunk_ids: Vec<u32> = store.embeddings().iter().map(|e| e.chunk_id).collect();
        assert_eq!(chunk_ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_small_rows_share_one_request() {
        let rows: Vec<Row> = (1..=3).map(|id| Row::new(id, format!("note {id}"))).collect();
        let queue = Arc::new(WorkQueue::new());
        queue.extend(rows.clone());
        let store = Arc::new(MemoryStore::new(StorageVariant::SameTable, rows));
        let provider = Arc::new(StubProvider::new());

        let stats = Worker::new(0, provider.clone(), context(store.clone(), queue, 50, 2048))
            .run()
            .await
            .unwrap();

        assert_eq!(provider.requests(), vec![vec![
            "note 1".to_string(),
            "note 2".to_string(),
            "note 3".to_string(),
        ]]);
        assert_eq!(stats.rows_completed, 3);
    }

    #[tokio::test]
    async fn test_failure_cancels_shared_token() {
        let queue = Arc::new(WorkQueue::new());
        queue.push(Row::new(1, "hello"));
        let store = Arc::new(MemoryStore::new(StorageVariant::SameTable, Vec::new()));
        let provider = Arc::new(StubProvider::new().failing());
        let ctx = context(store, queue, 50, 2048);

        let result = Worker::new(0, provider, Arc::clone(&ctx)).run().await;

        assert!(result.is_err());
        assert!(ctx.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_worker_takes_nothing() {
        let queue = Arc::new(WorkQueue::new());
        queue.push(Row::new(1, "hello"));
        let store = Arc::new(MemoryStore::new(StorageVariant::SameTable, Vec::new()));
        let provider = Arc::new(StubProvider::new());
        let ctx = context(store, Arc::clone(&queue), 50, 2048);
        ctx.cancel.cancel();

        let stats = Worker::new(0, provider.clone(), ctx).run().await.unwrap();

        assert_eq!(stats, WorkerStats::default());
        assert_eq!(provider.attempts(), 0);
        assert_eq!(queue.len(), 1);
    }
}
