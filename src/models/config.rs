use std::fmt;
use std::time::Duration;

use clap::{ArgAction, Args};
use serde::{Deserialize, Serialize};

use super::row::EmbeddingConfiguration;
use crate::error::ConfigError;
use crate::utils::retry::RetryPolicy;

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_API_VERSION: &str = "2024-02-01";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;
pub const DEFAULT_PROVIDER_BATCH_SIZE: usize = 50;
pub const DEFAULT_PAGE_SIZE: usize = 5000;
pub const DEFAULT_CHUNK_MAX_LENGTH: usize = 2048;

/// Complete runtime configuration, read from flags or environment variables.
#[derive(Debug, Clone, Args)]
pub struct Config {
    #[command(flatten)]
    pub storage: StorageConfig,

    #[command(flatten)]
    pub embedding: EmbeddingConfig,

    #[command(flatten)]
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Validate everything needed for a full run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.validate()?;
        self.embedding.validate()?;
        self.pipeline.validate()
    }

    /// Per-run embedding settings shared read-only by every worker.
    ///
    /// The same-table variant stores one embedding per row, so chunking is
    /// always off there.
    pub fn embedding_configuration(&self) -> EmbeddingConfiguration {
        EmbeddingConfiguration {
            dimensions: self.embedding.dimensions,
            chunk_text: self.pipeline.chunk_text && self.storage.is_dedicated(),
            chunk_max_length: self.pipeline.chunk_max_length,
        }
    }
}

/// Which storage layout receives the embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageVariant {
    /// Embedding column on the source row.
    SameTable,
    /// Child table with one row per chunk.
    DedicatedTable,
}

impl fmt::Display for StorageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageVariant::SameTable => write!(f, "same-table"),
            StorageVariant::DedicatedTable => write!(f, "dedicated-table"),
        }
    }
}

#[derive(Debug, Clone, Args)]
#[command(next_help_heading = "Storage")]
pub struct StorageConfig {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Source table, optionally schema-qualified
    #[arg(long = "table", env = "TABLE_NAME")]
    pub table_name: String,

    #[arg(long = "id-column", env = "ID_COLUMN_NAME", default_value = "id")]
    pub id_column: String,

    #[arg(long = "content-column", env = "CONTENT_COLUMN_NAME", default_value = "content")]
    pub content_column: String,

    #[arg(
        long = "embedding-column",
        env = "EMBEDDING_COLUMN_NAME",
        default_value = "embedding"
    )]
    pub embedding_column: String,

    /// Child table receiving one embedding per chunk; unset writes into the source table
    #[arg(long = "dedicated-table", env = "DEDICATED_EMBEDDINGS_TABLE")]
    pub dedicated_table: Option<String>,

    #[arg(
        long = "parent-id-column",
        env = "DEDICATED_PARENT_ID_COLUMN",
        default_value = "parent_id"
    )]
    pub parent_id_column: String,

    #[arg(
        long = "chunk-id-column",
        env = "DEDICATED_CHUNK_ID_COLUMN",
        default_value = "chunk_id"
    )]
    pub chunk_id_column: String,

    #[arg(
        long = "chunk-text-column",
        env = "DEDICATED_CHUNK_TEXT_COLUMN",
        default_value = "chunk_text"
    )]
    pub chunk_text_column: String,

    /// Create the dedicated table when it does not exist
    #[arg(long = "auto-create", env = "AUTO_CREATE_DEDICATED_TABLE")]
    pub auto_create: bool,

    /// Store the chunk text next to each embedding in the dedicated table
    #[arg(long = "save-chunk-text", env = "SAVE_CHUNK_TEXT")]
    pub save_chunk_text: bool,

    #[arg(long = "db-pool-max", env = "DB_POOL_MAX", default_value_t = 10)]
    pub pool_max: u32,

    #[arg(
        long = "db-acquire-timeout",
        env = "DB_ACQUIRE_TIMEOUT_SECS",
        default_value_t = 30
    )]
    pub acquire_timeout_secs: u64,
}

impl StorageConfig {
    /// Dedicated table name, treating an empty value as unset.
    pub fn dedicated_table(&self) -> Option<&str> {
        self.dedicated_table
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn is_dedicated(&self) -> bool {
        self.dedicated_table().is_some()
    }

    pub fn variant(&self) -> StorageVariant {
        if self.is_dedicated() {
            StorageVariant::DedicatedTable
        } else {
            StorageVariant::SameTable
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut identifiers = vec![
            ("table", &self.table_name),
            ("id column", &self.id_column),
            ("content column", &self.content_column),
            ("embedding column", &self.embedding_column),
        ];
        if self.is_dedicated() {
            identifiers.push(("parent id column", &self.parent_id_column));
            identifiers.push(("chunk id column", &self.chunk_id_column));
            if self.save_chunk_text {
                identifiers.push(("chunk text column", &self.chunk_text_column));
            }
        }

        for (label, value) in identifiers {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{label} must not be empty")));
            }
        }

        if self.database_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database url must not be empty".to_string(),
            ));
        }

        if self.pool_max == 0 {
            return Err(ConfigError::ValidationError(
                "database pool size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Embedding provider API flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Azure OpenAI deployments (`api-key` header)
    #[default]
    Azure,
    /// OpenAI-compatible `/embeddings` endpoint (bearer token)
    OpenAi,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "azure" | "azure-openai" => Ok(ProviderKind::Azure),
            "openai" => Ok(ProviderKind::OpenAi),
            _ => Err(format!("unknown embedding provider: {}", s)),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Azure => write!(f, "azure"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

/// One provider endpoint with its credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub url: String,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Args)]
#[command(next_help_heading = "Embedding provider")]
pub struct EmbeddingConfig {
    #[arg(long = "provider", env = "EMBEDDING_PROVIDER", default_value = "azure")]
    pub provider: ProviderKind,

    /// Provider endpoint(s), comma-separated
    #[arg(long = "provider-url", env = "OPENAI_URL", value_delimiter = ',')]
    pub urls: Vec<String>,

    /// Provider key(s), comma-separated and aligned with the endpoints
    #[arg(long = "provider-key", env = "OPENAI_KEY", hide_env_values = true)]
    pub keys: Option<String>,

    /// Model name (OpenAI) or deployment name (Azure)
    #[arg(
        long = "model",
        env = "OPENAI_EMBEDDING_DEPLOYMENT_NAME",
        default_value = DEFAULT_EMBEDDING_MODEL
    )]
    pub model: String,

    #[arg(long = "api-version", env = "OPENAI_API_VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    pub dimensions: usize,

    /// Texts per provider request
    #[arg(long = "batch-size", env = "EMBEDDING_BATCH_SIZE", default_value_t = DEFAULT_PROVIDER_BATCH_SIZE)]
    pub batch_size: usize,

    #[arg(long = "timeout", env = "EMBEDDING_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,
}

impl EmbeddingConfig {
    /// Pair endpoints with keys. Without keys every endpoint is called
    /// without a credential header.
    pub fn endpoints(&self) -> Result<Vec<ProviderEndpoint>, ConfigError> {
        let urls: Vec<&str> = self
            .urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .collect();

        if urls.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one provider url is required".to_string(),
            ));
        }

        let keys: Vec<Option<String>> = match self.keys.as_deref().map(str::trim) {
            None | Some("") => vec![None; urls.len()],
            Some(raw) => raw
                .split(',')
                .map(|k| Some(k.trim().to_string()).filter(|k| !k.is_empty()))
                .collect(),
        };

        if keys.len() != urls.len() {
            return Err(ConfigError::EndpointKeyMismatch {
                urls: urls.len(),
                keys: keys.len(),
            });
        }

        Ok(urls
            .into_iter()
            .zip(keys)
            .map(|(url, key)| ProviderEndpoint {
                url: url.to_string(),
                key,
            })
            .collect())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoints()?;
        if self.dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "embedding dimensions must be greater than 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding batch size must be greater than 0".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "embedding model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(next_help_heading = "Pipeline")]
pub struct PipelineConfig {
    /// Rows loaded into the work queue per page
    #[arg(long = "page-size", env = "QUEUE_BATCH_SIZE", default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Concurrent workers; 0 uses two per provider endpoint
    #[arg(long = "max-tasks", env = "MAX_TASKS", default_value_t = 0)]
    pub max_tasks: usize,

    /// Split long text into chunks (dedicated table only)
    #[arg(long = "chunk-text", env = "CHUNK_TEXT", default_value_t = true, action = ArgAction::Set)]
    pub chunk_text: bool,

    #[arg(long = "chunk-max-length", env = "CHUNK_MAX_LENGTH", default_value_t = DEFAULT_CHUNK_MAX_LENGTH)]
    pub chunk_max_length: usize,

    #[arg(long = "throttle-delay", env = "THROTTLE_RETRY_DELAY_SECS", default_value_t = 10)]
    pub throttle_delay_secs: u64,

    #[arg(long = "max-attempts", env = "THROTTLE_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,
}

impl PipelineConfig {
    /// Worker pool size for the given number of provider clients.
    pub fn worker_count(&self, clients: usize) -> usize {
        if self.max_tasks == 0 {
            clients.max(1) * 2
        } else {
            self.max_tasks
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts).with_delay(Duration::from_secs(self.throttle_delay_secs))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::ValidationError(
                "page size must be greater than 0".to_string(),
            ));
        }
        if self.chunk_max_length == 0 {
            return Err(ConfigError::ValidationError(
                "chunk max length must be greater than 0".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
