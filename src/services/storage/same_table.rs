use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row as _;
use sqlx::postgres::PgPool;

use super::{EmbeddingStore, TRACING_TARGET, postgres};
use crate::error::StorageError;
use crate::models::{ChunkedText, Row, StorageConfig, StorageVariant, TableInfo};
use crate::services::queue::WorkQueue;

/// Statements for the same-table layout, built once from the quoted identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SameTableQueries {
    pub count: String,
    pub page: String,
    pub update: String,
}

impl SameTableQueries {
    pub fn new(table: &TableInfo) -> Self {
        // Rows with text and no embedding yet.
        let filter = format!(
            "{embedding} IS NULL AND {text} IS NOT NULL AND {text} ~ '\\S'",
            embedding = table.embedding_column,
            text = table.text_column,
        );

        Self {
            count: format!("SELECT COUNT(*) FROM {} WHERE {}", table.table, filter),
            page: format!(
                "SELECT CAST({id} AS BIGINT) AS id, {text} AS text \
                 FROM {table} WHERE {filter} ORDER BY {id} LIMIT $1",
                id = table.id_column,
                text = table.text_column,
                table = table.table,
            ),
            update: format!(
                "UPDATE {} SET {} = $1 WHERE {} = $2",
                table.table, table.embedding_column, table.id_column
            ),
        }
    }
}

/// Writes one embedding per row into a column of the source table.
pub struct SameTableStore {
    pool: PgPool,
    table: TableInfo,
    queries: SameTableQueries,
}

impl SameTableStore {
    pub fn new(pool: PgPool, config: &StorageConfig) -> Self {
        let table = TableInfo::from_config(config);
        let queries = SameTableQueries::new(&table);
        Self {
            pool,
            table,
            queries,
        }
    }
}

#[async_trait]
impl EmbeddingStore for SameTableStore {
    async fn test_connection(&self) -> Result<(), StorageError> {
        postgres::ping(&self.pool).await
    }

    async fn initialize_database(&self) -> Result<(), StorageError> {
        postgres::check_pgvector_extension(&self.pool).await?;

        if !postgres::table_exists(&self.pool, &self.table.table).await? {
            return Err(StorageError::MissingTable(self.table.table.clone()));
        }

        postgres::check_columns(
            &self.pool,
            &self.table.table,
            &[
                self.table.id_column.as_str(),
                self.table.text_column.as_str(),
                self.table.embedding_column.as_str(),
            ],
        )
        .await
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let row: (i64,) = sqlx::query_as(&self.queries.count)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0.max(0) as u64)
    }

    async fn load_page(&self, max_rows: usize, queue: &WorkQueue) -> Result<usize, StorageError> {
        let rows = sqlx::query(&self.queries.page)
            .bind(max_rows as i64)
            .fetch_all(&self.pool)
            .await?;

        let loaded = rows
            .into_iter()
            .map(|row| -> Result<Row, sqlx::Error> {
                Ok(Row {
                    id: row.try_get("id")?,
                    text: row.try_get("text")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(target: TRACING_TARGET, rows = loaded.len(), "Fetched pending rows");
        Ok(queue.extend(loaded))
    }

    async fn save_embedding(
        &self,
        chunk: &ChunkedText,
        embedding: Vec<f32>,
    ) -> Result<(), StorageError> {
        sqlx::query(&self.queries.update)
            .bind(Vector::from(embedding))
            .bind(chunk.row_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn variant(&self) -> StorageVariant {
        StorageVariant::SameTable
    }

    fn target(&self) -> String {
        format!("{}.{}", self.table.table, self.table.embedding_column)
    }
}
