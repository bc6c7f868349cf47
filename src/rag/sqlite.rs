//! SQLite-backed vector store.
//!
//! Chunks and their embeddings live in one table; search is a brute-force
//! cosine scan, which is plenty for a corpus of a few policy files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::store::{cosine_similarity, MetadataFilter, VectorStore};
use super::types::{Chunk, ScoredChunk};
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteVectorStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.index_db_path()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(ApiError::internal)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                chunk_index INTEGER NOT NULL DEFAULT 0,
                start_offset INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    async fn insert_rows(
        conn: &mut SqliteConnection,
        items: &[(Chunk, Vec<f32>)],
    ) -> Result<(), ApiError> {
        for (chunk, embedding) in items {
            let blob = Self::serialize_embedding(embedding);
            let metadata_str = serde_json::to_string(&chunk.metadata).map_err(ApiError::internal)?;

            sqlx::query(
                "INSERT OR REPLACE INTO chunks
                    (chunk_id, content, source, chunk_index, start_offset, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.content)
            .bind(&chunk.source)
            .bind(chunk.chunk_index as i64)
            .bind(chunk.start_offset as i64)
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *conn)
            .await
            .map_err(ApiError::internal)?;
        }
        Ok(())
    }

    async fn delete_all(conn: &mut SqliteConnection) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM chunks")
            .execute(&mut *conn)
            .await
            .map_err(ApiError::internal)?;
        sqlx::query("DELETE FROM index_meta")
            .execute(&mut *conn)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }

    async fn upsert_meta(conn: &mut SqliteConnection, key: &str, value: &str) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT OR REPLACE INTO index_meta (key, value, updated_at)
             VALUES (?1, ?2, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *conn)
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
        let metadata_str: String = row.get("metadata");
        let metadata = serde_json::from_str::<Map<String, Value>>(&metadata_str).unwrap_or_default();
        let chunk_index: i64 = row.get("chunk_index");
        let start_offset: i64 = row.get("start_offset");

        Chunk {
            chunk_id: row.get("chunk_id"),
            content: row.get("content"),
            source: row.get("source"),
            chunk_index: chunk_index.max(0) as usize,
            start_offset: start_offset.max(0) as usize,
            metadata,
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert_batch(&self, items: Vec<(Chunk, Vec<f32>)>) -> Result<(), ApiError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        Self::insert_rows(&mut tx, &items).await?;
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn replace_all(
        &self,
        items: Vec<(Chunk, Vec<f32>)>,
        meta: &[(&str, &str)],
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        Self::delete_all(&mut tx).await?;
        Self::insert_rows(&mut tx, &items).await?;
        for (key, value) in meta {
            Self::upsert_meta(&mut tx, key, value).await?;
        }
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT chunk_id, content, source, chunk_index, start_offset, metadata, embedding
             FROM chunks
             ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let chunk = Self::row_to_chunk(row);
                if let Some(filter) = filter {
                    if !filter.matches(&chunk.metadata) {
                        return None;
                    }
                }
                let stored = Self::deserialize_embedding(&embedding_bytes);
                let score = cosine_similarity(query_embedding, &stored);
                Some(ScoredChunk { chunk, score })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(count as usize)
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>, ApiError> {
        sqlx::query_scalar::<_, String>("SELECT value FROM index_meta WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<(), ApiError> {
        let mut conn = self.pool.acquire().await.map_err(ApiError::internal)?;
        Self::upsert_meta(&mut conn, key, value).await
    }

    async fn clear(&self) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        Self::delete_all(&mut tx).await?;
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
