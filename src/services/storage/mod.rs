//! Storage source/sink abstraction.
//!
//! The pipeline reads pending rows and writes embeddings through the
//! [`EmbeddingStore`] trait. Two PostgreSQL layouts are provided: the
//! embedding column on the source row, or a dedicated child table holding one
//! embedding per chunk. The layout is chosen once at startup.

mod dedicated_table;
#[cfg(test)]
pub(crate) mod memory;
mod postgres;
mod same_table;

pub use dedicated_table::DedicatedTableStore;
pub use same_table::SameTableStore;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::models::{ChunkedText, StorageConfig, StorageVariant};
use crate::services::queue::WorkQueue;

/// Tracing target for storage operations.
const TRACING_TARGET: &str = "vectorizer::storage";

/// Source of pending rows and sink for their embeddings.
///
/// Pending rows are rows with non-blank text and no stored embedding, so
/// `count` shrinks as `save_embedding` calls succeed and a rerun resumes
/// where the previous one stopped.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Verify connectivity without side effects.
    async fn test_connection(&self) -> Result<(), StorageError>;

    /// Provision or verify the objects the store writes to. Idempotent.
    async fn initialize_database(&self) -> Result<(), StorageError>;

    /// Number of rows still lacking an embedding.
    async fn count(&self) -> Result<u64, StorageError>;

    /// Enqueue up to `max_rows` pending rows, returning how many were enqueued.
    ///
    /// Zero means nothing is left to process.
    async fn load_page(&self, max_rows: usize, queue: &WorkQueue) -> Result<usize, StorageError>;

    /// Persist the embedding of one chunk. Safe to call concurrently for
    /// different rows.
    async fn save_embedding(
        &self,
        chunk: &ChunkedText,
        embedding: Vec<f32>,
    ) -> Result<(), StorageError>;

    /// Persist every chunk embedding of one row, all or nothing.
    ///
    /// A row with only some chunks stored would no longer count as pending,
    /// so partial rows must never become visible.
    async fn save_row(&self, embeddings: Vec<(ChunkedText, Vec<f32>)>) -> Result<(), StorageError> {
        for (chunk, embedding) in embeddings {
            self.save_embedding(&chunk, embedding).await?;
        }
        Ok(())
    }

    /// Storage layout implemented by this store.
    fn variant(&self) -> StorageVariant;

    /// Where embeddings end up, for display.
    fn target(&self) -> String;
}

/// Create the store matching the configured layout.
pub fn create_store(
    config: &StorageConfig,
    dimensions: usize,
) -> Result<Box<dyn EmbeddingStore>, StorageError> {
    let pool = postgres::connect(config)?;

    match config.dedicated_table() {
        Some(table) => Ok(Box::new(DedicatedTableStore::new(
            pool, config, table, dimensions,
        ))),
        None => Ok(Box::new(SameTableStore::new(pool, config))),
    }
}
