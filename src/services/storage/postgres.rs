use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::StorageError;
use crate::models::StorageConfig;

/// Open a lazily connecting pool; `test_connection` performs the first round trip.
pub(super) fn connect(config: &StorageConfig) -> Result<PgPool, StorageError> {
    PgPoolOptions::new()
        .max_connections(config.pool_max)
        .acquire_timeout(config.acquire_timeout())
        .connect_lazy(&config.database_url)
        .map_err(|e| StorageError::ConnectionError(e.to_string()))
}

pub(super) async fn ping(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| StorageError::ConnectionError(e.to_string()))
}

pub(super) async fn check_pgvector_extension(pool: &PgPool) -> Result<(), StorageError> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT extname::text FROM pg_extension WHERE extname = 'vector'")
            .fetch_optional(pool)
            .await?;

    if result.is_none() {
        return Err(StorageError::PgVectorExtensionError(
            "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
        ));
    }

    Ok(())
}

/// Whether a (quoted, possibly schema-qualified) table exists.
pub(super) async fn table_exists(pool: &PgPool, quoted_table: &str) -> Result<bool, StorageError> {
    let row: (bool,) = sqlx::query_as("SELECT to_regclass($1) IS NOT NULL")
        .bind(quoted_table)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Fail unless every listed column can be selected from the table.
pub(super) async fn check_columns(
    pool: &PgPool,
    quoted_table: &str,
    quoted_columns: &[&str],
) -> Result<(), StorageError> {
    let query = format!(
        "SELECT {} FROM {} LIMIT 0",
        quoted_columns.join(", "),
        quoted_table
    );
    sqlx::query(&query)
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| StorageError::MissingColumn {
            table: quoted_table.to_string(),
            message: e.to_string(),
        })
}
