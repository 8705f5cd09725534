use serde::{Deserialize, Serialize};

/// A source-table record awaiting an embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: i64,
    pub text: String,
}

impl Row {
    pub fn new(id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

/// One fragment of a row's text, the unit sent to the embedding provider.
///
/// `chunk_id` is 1-based and increases left to right within a row; it is 0
/// when chunking is disabled and the row contributes a single fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkedText {
    pub row_id: i64,
    pub chunk_id: u32,
    pub text: String,
}

/// Embedding settings fixed at startup and shared read-only by all workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingConfiguration {
    pub dimensions: usize,
    pub chunk_text: bool,
    pub chunk_max_length: usize,
}
