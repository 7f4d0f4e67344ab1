//! Vector row persistence and nearest-neighbor lookup against PostgreSQL + pgvector.

use crate::config::get_config;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned while interacting with the vector store.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Configured table name contains characters that cannot be interpolated safely.
    #[error("Invalid vector table name: {0}")]
    InvalidTableName(String),
    /// Database request failed.
    #[error("Database request failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Row persisted once per successfully embedded chunk; never updated afterwards.
#[derive(Debug, Clone)]
pub struct VectorRow {
    /// Chunk id, matching the chunk's status record.
    pub id: Uuid,
    /// Embedding vector produced for the chunk text.
    pub embedding: Vec<f32>,
    /// Original chunk text.
    pub text: String,
    /// Source file name.
    pub file_name: String,
    /// 1-based page number the chunk came from.
    pub page_number: u32,
}

/// Match returned by a nearest-neighbor query, closest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMatch {
    /// Chunk id of the stored row.
    pub id: Uuid,
    /// Stored chunk text.
    pub text: String,
    /// Source file name.
    pub file_name: String,
    /// 1-based page number.
    pub page_number: u32,
}

/// Consumed contract of the vector-capable relational store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert one vector row. Rows are write-once; failures are reported, not retried here.
    async fn insert(&self, row: VectorRow) -> Result<(), VectorStoreError>;

    /// Return up to `k` stored rows ordered by ascending distance to the query embedding.
    async fn nearest_neighbors(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<DocumentMatch>, VectorStoreError>;
}

/// pgvector-backed implementation speaking plain SQL through sqlx.
pub struct PgVectorStore {
    pool: PgPool,
    table: String,
}

impl PgVectorStore {
    /// Connect to the configured database and validate the table name.
    pub async fn connect() -> Result<Self, VectorStoreError> {
        let config = get_config();
        let table = config.vector_table_name.clone();
        if !is_safe_identifier(&table) {
            return Err(VectorStoreError::InvalidTableName(table));
        }

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url)
            .await?;
        tracing::debug!(table = %table, "Connected to vector store");
        Ok(Self { pool, table })
    }

    /// Create the vector extension and table when they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), VectorStoreError> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id uuid PRIMARY KEY,
                embedding vector NOT NULL,
                origntext text NOT NULL,
                filename text NOT NULL,
                pagenumber integer NOT NULL
            )",
            self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        tracing::debug!(table = %self.table, "Vector table ensured");
        Ok(())
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn insert(&self, row: VectorRow) -> Result<(), VectorStoreError> {
        let sql = insert_sql(&self.table);
        sqlx::query(&sql)
            .bind(row.id)
            .bind(format_pgvector(&row.embedding))
            .bind(&row.text)
            .bind(&row.file_name)
            .bind(row.page_number as i32)
            .execute(&self.pool)
            .await?;
        tracing::debug!(id = %row.id, file = %row.file_name, page = row.page_number, "Vector row inserted");
        Ok(())
    }

    async fn nearest_neighbors(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<DocumentMatch>, VectorStoreError> {
        let sql = nearest_neighbor_sql(&self.table);
        let rows = sqlx::query(&sql)
            .bind(format_pgvector(embedding))
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in rows {
            matches.push(DocumentMatch {
                id: row.try_get("id")?,
                text: row.try_get("origntext")?,
                file_name: row.try_get("filename")?,
                page_number: row.try_get::<i32, _>("pagenumber")? as u32,
            });
        }
        Ok(matches)
    }
}

fn insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {table} (id, embedding, origntext, filename, pagenumber) \
         VALUES ($1, $2::vector, $3, $4, $5)"
    )
}

// `<->` is pgvector's distance operator, so ascending order yields closest rows first.
fn nearest_neighbor_sql(table: &str) -> String {
    format!(
        "SELECT id, origntext, filename, pagenumber FROM {table} \
         ORDER BY embedding <-> $1::vector LIMIT $2"
    )
}

/// Render an embedding in pgvector's text literal form, e.g. `[0.1,0.2,0.3]`.
fn format_pgvector(embedding: &[f32]) -> String {
    let mut out = String::with_capacity(embedding.len() * 10 + 2);
    out.push('[');
    for (index, component) in embedding.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push_str(&component.to_string());
    }
    out.push(']');
    out
}

fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pgvector_literal_matches_expected_form() {
        assert_eq!(format_pgvector(&[]), "[]");
        assert_eq!(format_pgvector(&[0.5]), "[0.5]");
        assert_eq!(format_pgvector(&[1.0, -2.5, 0.25]), "[1,-2.5,0.25]");
    }

    #[test]
    fn nearest_neighbor_query_orders_by_ascending_distance() {
        let sql = nearest_neighbor_sql("documents");
        assert!(sql.starts_with("SELECT id, origntext, filename, pagenumber FROM documents"));
        assert!(sql.contains("ORDER BY embedding <-> $1::vector"));
        assert!(sql.ends_with("LIMIT $2"));
    }

    #[test]
    fn insert_statement_covers_every_row_column() {
        let sql = insert_sql("documents");
        assert!(sql.starts_with("INSERT INTO documents"));
        assert!(sql.contains("(id, embedding, origntext, filename, pagenumber)"));
        assert!(sql.contains("VALUES ($1, $2::vector, $3, $4, $5)"));
    }

    #[test]
    fn identifier_check_rejects_injection_attempts() {
        assert!(is_safe_identifier("documents"));
        assert!(is_safe_identifier("doc_vectors_2"));
        assert!(!is_safe_identifier("documents; DROP TABLE users"));
        assert!(!is_safe_identifier("1documents"));
        assert!(!is_safe_identifier(""));
    }
}
