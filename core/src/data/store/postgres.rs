//! PostgreSQL implementation of [`Store`]
//!
//! Upserts use `INSERT ... ON CONFLICT ... DO UPDATE`, matching the teacher's
//! atomic-upsert pattern, keyed by the natural identities named in
//! §6 External Interfaces.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{ChunkWrite, ConversationWrite, Store, StoreError};

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn upsert_chunk(&self, chunk: ChunkWrite) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO chunks (
                repository, file_path, language, chunk_type, content,
                start_line, end_line, embedding, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            ON CONFLICT (repository, file_path, start_line, end_line) DO UPDATE SET
                language = $3,
                chunk_type = $4,
                content = $5,
                embedding = $8,
                metadata = $9,
                updated_at = $10
            "#,
        )
        .bind(&chunk.repository)
        .bind(&chunk.file_path)
        .bind(&chunk.language)
        .bind(&chunk.chunk_type)
        .bind(&chunk.content)
        .bind(chunk.start_line)
        .bind(chunk.end_line)
        .bind(&chunk.embedding)
        .bind(&chunk.metadata)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_conversation(&self, conversation: ConversationWrite) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO conversations (
                session, project, "timestamp", content_hash, user_message, assistant_message, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (session, "timestamp", content_hash) DO NOTHING
            "#,
        )
        .bind(&conversation.session)
        .bind(&conversation.project)
        .bind(conversation.timestamp)
        .bind(&conversation.content_hash)
        .bind(&conversation.user_message)
        .bind(&conversation.assistant_message)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn rows_written_last_hour(&self) -> Result<u64, StoreError> {
        let since = chrono::Utc::now().timestamp() - 3600;

        let (chunk_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM chunks WHERE created_at >= $1")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;
        let (conversation_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM conversations WHERE created_at >= $1")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;

        Ok((chunk_count + conversation_count).max(0) as u64)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
