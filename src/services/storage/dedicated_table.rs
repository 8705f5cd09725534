use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row as _;
use sqlx::postgres::{PgArguments, PgPool, Postgres};
use sqlx::query::Query;

use super::{EmbeddingStore, TRACING_TARGET, postgres};
use crate::error::StorageError;
use crate::models::{
    ChunkedText, DedicatedTableInfo, Row, StorageConfig, StorageVariant, TableInfo,
};
use crate::services::queue::WorkQueue;

/// Statements for the dedicated-table layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct DedicatedTableQueries {
    pub count: String,
    pub page: String,
    /// Binds parent id, chunk id, vector and, when chunk text is saved, the text.
    pub insert: String,
    pub create_table: String,
    pub create_index: String,
}

impl DedicatedTableQueries {
    pub fn new(
        source: &TableInfo,
        target: &DedicatedTableInfo,
        dimensions: usize,
        save_chunk_text: bool,
    ) -> Self {
        // Anti-join: source rows with text and no row in the dedicated table.
        let filter = format!(
            "s.{text} IS NOT NULL AND s.{text} ~ '\\S' AND NOT EXISTS (\
             SELECT 1 FROM {target} e WHERE e.{parent} = s.{id})",
            text = source.text_column,
            target = target.table,
            parent = target.parent_id_column,
            id = source.id_column,
        );

        let insert = if save_chunk_text {
            format!(
                "INSERT INTO {} ({}, {}, {}, {}) VALUES ($1, $2, $3, $4)",
                target.table,
                target.parent_id_column,
                target.chunk_id_column,
                target.embedding_column,
                target.chunk_text_column
            )
        } else {
            format!(
                "INSERT INTO {} ({}, {}, {}) VALUES ($1, $2, $3)",
                target.table,
                target.parent_id_column,
                target.chunk_id_column,
                target.embedding_column
            )
        };

        Self {
            count: format!("SELECT COUNT(*) FROM {} s WHERE {}", source.table, filter),
            page: format!(
                "SELECT CAST(s.{id} AS BIGINT) AS id, s.{text} AS text \
                 FROM {table} s WHERE {filter} ORDER BY s.{id} LIMIT $1",
                id = source.id_column,
                text = source.text_column,
                table = source.table,
            ),
            insert,
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {} (\
                 id BIGSERIAL PRIMARY KEY, \
                 {} BIGINT NOT NULL, \
                 {} INTEGER NOT NULL, \
                 {} TEXT NULL, \
                 {} vector({}) NOT NULL)",
                target.table,
                target.parent_id_column,
                target.chunk_id_column,
                target.chunk_text_column,
                target.embedding_column,
                dimensions
            ),
            create_index: format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                target.parent_index, target.table, target.parent_id_column
            ),
        }
    }
}

/// Appends one embedding row per chunk to a child table referencing the source row.
pub struct DedicatedTableStore {
    pool: PgPool,
    source: TableInfo,
    target: DedicatedTableInfo,
    queries: DedicatedTableQueries,
    auto_create: bool,
    save_chunk_text: bool,
}

impl DedicatedTableStore {
    pub fn new(pool: PgPool, config: &StorageConfig, table: &str, dimensions: usize) -> Self {
        let source = TableInfo::from_config(config);
        let target = DedicatedTableInfo::new(table, config);
        let queries =
            DedicatedTableQueries::new(&source, &target, dimensions, config.save_chunk_text);
        Self {
            pool,
            source,
            target,
            queries,
            auto_create: config.auto_create,
            save_chunk_text: config.save_chunk_text,
        }
    }

    async fn create_table(&self) -> Result<(), StorageError> {
        sqlx::query(&self.queries.create_table)
            .execute(&self.pool)
            .await?;
        sqlx::query(&self.queries.create_index)
            .execute(&self.pool)
            .await?;

        tracing::info!(
            target: TRACING_TARGET,
            table = %self.target.table,
            "Created dedicated embeddings table"
        );
        Ok(())
    }

    fn insert<'q>(
        &'q self,
        chunk: &'q ChunkedText,
        embedding: Vec<f32>,
    ) -> Query<'q, Postgres, PgArguments> {
        let statement = sqlx::query(&self.queries.insert)
            .bind(chunk.row_id)
            .bind(chunk.chunk_id as i32)
            .bind(Vector::from(embedding));
        if self.save_chunk_text {
            statement.bind(&chunk.text)
        } else {
            statement
        }
    }
}

#[async_trait]
impl EmbeddingStore for DedicatedTableStore {
    async fn test_connection(&self) -> Result<(), StorageError> {
        postgres::ping(&self.pool).await
    }

    async fn initialize_database(&self) -> Result<(), StorageError> {
        postgres::check_pgvector_extension(&self.pool).await?;

        if !postgres::table_exists(&self.pool, &self.source.table).await? {
            return Err(StorageError::MissingTable(self.source.table.clone()));
        }
        postgres::check_columns(
            &self.pool,
            &self.source.table,
            &[
                self.source.id_column.as_str(),
                self.source.text_column.as_str(),
            ],
        )
        .await?;

        if !postgres::table_exists(&self.pool, &self.target.table).await? {
            if !self.auto_create {
                return Err(StorageError::MissingTable(self.target.table.clone()));
            }
            self.create_table().await?;
        }

        let mut columns = vec![
            self.target.parent_id_column.as_str(),
            self.target.chunk_id_column.as_str(),
            self.target.embedding_column.as_str(),
        ];
        if self.save_chunk_text {
            columns.push(self.target.chunk_text_column.as_str());
        }
        postgres::check_columns(&self.pool, &self.target.table, &columns).await
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
        self.insert(chunk, embedding).execute(&self.pool).await?;
        Ok(())
    }

    async fn save_row(&self, embeddings: Vec<(ChunkedText, Vec<f32>)>) -> Result<(), StorageError> {
        // Any chunk row makes the parent non-pending, so the row commits whole.
        let mut tx = self.pool.begin().await?;
        for (chunk, embedding) in embeddings {
            self.insert(&chunk, embedding).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    fn variant(&self) -> StorageVariant {
        StorageVariant::DedicatedTable
    }

    fn target(&self) -> String {
        self.target.table.clone()
    }
}
