//! In-memory store used by the pipeline tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::EmbeddingStore;
use crate::error::StorageError;
use crate::models::{ChunkedText, Row, StorageVariant};
use crate::services::queue::WorkQueue;
use crate::utils::is_blank;

/// One persisted embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbedding {
    pub row_id: i64,
    pub chunk_id: u32,
    pub text: Option<String>,
    pub embedding: Vec<f32>,
}

/// Mirrors the two PostgreSQL layouts without a database.
pub struct MemoryStore {
    variant: StorageVariant,
    rows: Vec<Row>,
    same_table: Mutex<BTreeMap<i64, StoredEmbedding>>,
    dedicated: Mutex<Vec<StoredEmbedding>>,
    pages_loaded: AtomicUsize,
    fail_saves_for: Option<i64>,
    save_chunk_text: bool,
}

impl MemoryStore {
    pub fn new(variant: StorageVariant, rows: Vec<Row>) -> Self {
        Self {
            variant,
            rows,
            same_table: Mutex::new(BTreeMap::new()),
            dedicated: Mutex::new(Vec::new()),
            pages_loaded: AtomicUsize::new(0),
            fail_saves_for: None,
            save_chunk_text: false,
        }
    }

    /// Keep chunk text next to dedicated-table embeddings.
    pub fn saving_chunk_text(mut self, save_chunk_text: bool) -> Self {
        self.save_chunk_text = save_chunk_text;
        self
    }

    /// Make every save for `row_id` fail with a storage error.
    pub fn failing_saves_for(mut self, row_id: i64) -> Self {
        self.fail_saves_for = Some(row_id);
        self
    }

    /// Everything saved so far, ordered by row then insertion.
    pub fn embeddings(&self) -> Vec<StoredEmbedding> {
        match self.variant {
            StorageVariant::SameTable => self.lock_same().values().cloned().collect(),
            StorageVariant::DedicatedTable => {
                let mut all = self.lock_dedicated().clone();
                all.sort_by_key(|e| e.row_id);
                all
            }
        }
    }

    pub fn embeddings_for(&self, row_id: i64) -> Vec<StoredEmbedding> {
        self.embeddings()
            .into_iter()
            .filter(|e| e.row_id == row_id)
            .collect()
    }

    /// Number of non-empty pages handed out by `load_page`.
    pub fn pages_loaded(&self) -> usize {
        self.pages_loaded.load(Ordering::SeqCst)
    }

    fn embedded_ids(&self) -> HashSet<i64> {
        match self.variant {
            StorageVariant::SameTable => self.lock_same().keys().copied().collect(),
            StorageVariant::DedicatedTable => {
                self.lock_dedicated().iter().map(|e| e.row_id).collect()
            }
        }
    }

    fn pending(&self) -> Vec<Row> {
        let embedded = self.embedded_ids();
        self.rows
            .iter()
            .filter(|r| !is_blank(&r.text) && !embedded.contains(&r.id))
            .cloned()
            .collect()
    }

    fn check_failure(&self, row_id: i64) -> Result<(), StorageError> {
        if self.fail_saves_for == Some(row_id) {
            return Err(StorageError::QueryError(format!(
                "constraint violation for row {}",
                row_id
            )));
        }
        Ok(())
    }

    /// Same-table rows have no place for chunk text.
    fn stored(&self, chunk: &ChunkedText, embedding: Vec<f32>) -> StoredEmbedding {
        let keep_text =
            self.save_chunk_text && self.variant == StorageVariant::DedicatedTable;
        StoredEmbedding {
            row_id: chunk.row_id,
            chunk_id: chunk.chunk_id,
            text: keep_text.then(|| chunk.text.clone()),
            embedding,
        }
    }

    fn lock_same(&self) -> std::sync::MutexGuard<'_, BTreeMap<i64, StoredEmbedding>> {
        self.same_table.lock().unwrap()
    }

    fn lock_dedicated(&self) -> std::sync::MutexGuard<'_, Vec<StoredEmbedding>> {
        self.dedicated.lock().unwrap()
    }
}

#[async_trait]
impl EmbeddingStore for MemoryStore {
    async fn test_connection(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn initialize_database(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.pending().len() as u64)
    }

    async fn load_page(&self, max_rows: usize, queue: &WorkQueue) -> Result<usize, StorageError> {
        let mut page = self.pending();
        page.sort_by_key(|r| r.id);
        page.truncate(max_rows);
        let loaded = queue.extend(page);
        if loaded > 0 {
            self.pages_loaded.fetch_add(1, Ordering::SeqCst);
        }
        Ok(loaded)
    }

    async fn save_embedding(
        &self,
        chunk: &ChunkedText,
        embedding: Vec<f32>,
    ) -> Result<(), StorageError> {
        self.check_failure(chunk.row_id)?;
        let stored = self.stored(chunk, embedding);

        match self.variant {
            StorageVariant::SameTable => {
                self.lock_same().insert(chunk.row_id, stored);
            }
            StorageVariant::DedicatedTable => self.lock_dedicated().push(stored),
        }
        Ok(())
    }

    async fn save_row(&self, embeddings: Vec<(ChunkedText, Vec<f32>)>) -> Result<(), StorageError> {
        for (chunk, _) in &embeddings {
            self.check_failure(chunk.row_id)?;
        }

        let stored: Vec<StoredEmbedding> = embeddings
            .into_iter()
            .map(|(chunk, embedding)| self.stored(&chunk, embedding))
            .collect();

        match self.variant {
            StorageVariant::SameTable => {
                let mut same = self.lock_same();
                for embedding in stored {
                    same.insert(embedding.row_id, embedding);
                }
            }
            StorageVariant::DedicatedTable => self.lock_dedicated().extend(stored),
        }
        Ok(())
    }

    fn variant(&self) -> StorageVariant {
        self.variant
    }

    fn target(&self) -> String {
        format!("memory:{}", self.variant)
    }
}
