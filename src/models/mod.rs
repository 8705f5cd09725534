mod config;
mod output;
mod row;
mod table;

pub use config::{
    Config, DEFAULT_API_VERSION, DEFAULT_CHUNK_MAX_LENGTH, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_PAGE_SIZE, DEFAULT_PROVIDER_BATCH_SIZE, EmbeddingConfig,
    PipelineConfig, ProviderEndpoint, ProviderKind, StorageConfig, StorageVariant,
};
pub use output::OutputFormat;
pub use row::{ChunkedText, EmbeddingConfiguration, Row};
pub use table::{DedicatedTableInfo, TableInfo, base_name, quote_identifier};
