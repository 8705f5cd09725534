//! Error types for the table vectorizer.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to embedding provider calls.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider throttled the request: {0}")]
    Throttled(String),

    #[error("failed to connect to embedding provider: {0}")]
    ConnectionError(String),

    #[error("embedding provider error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        // Only rate limiting is transient; everything else aborts the run.
        matches!(self, EmbeddingError::Throttled(_))
    }
}

/// Errors related to the storage source/sink.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to database: {0}")]
    ConnectionError(String),

    #[error("query failed: {0}")]
    QueryError(String),

    #[error("table {0} does not exist")]
    MissingTable(String),

    #[error("column check failed on {table}: {message}")]
    MissingColumn { table: String, message: String },

    #[error("pgvector extension error: {0}")]
    PgVectorExtensionError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::ConnectionError(err.to_string())
            }
            other => StorageError::QueryError(other.to_string()),
        }
    }
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("provider endpoint and key count mismatch ({urls} urls, {keys} keys)")]
    EndpointKeyMismatch { urls: usize, keys: usize },

    #[error("failed to load env file: {0}")]
    EnvFile(String),
}

/// Errors that abort a vectorization run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("embedding provider still failing after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: EmbeddingError,
    },

    #[error("unexpected embedding dimensions {actual} (expected {expected})")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("provider returned {actual} embeddings for {expected} inputs")]
    ResponseLength { expected: usize, actual: usize },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("worker task failed: {0}")]
    WorkerPanicked(String),

    #[error("no embedding provider configured")]
    NoProviders,

    #[error("run cancelled")]
    Cancelled,
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_throttled_is_retryable() {
        assert!(EmbeddingError::Throttled("429".to_string()).is_retryable());
        assert!(!EmbeddingError::ServerError("status 500".to_string()).is_retryable());
        assert!(!EmbeddingError::Timeout.is_retryable());
        assert!(!EmbeddingError::InvalidResponse("bad json".to_string()).is_retryable());
        assert!(!EmbeddingError::ConnectionError("refused".to_string()).is_retryable());
    }

    #[test]
    fn test_retries_exhausted_message() {
        let err = PipelineError::RetriesExhausted {
            attempts: 3,
            source: EmbeddingError::Throttled("status 429".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("429"));
    }
}
