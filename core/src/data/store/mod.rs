//! Relational store adapter
//!
//! The narrow write-upsert interface and small set of read aggregates the
//! core needs against the relational store, per §6 External Interfaces.
//! The store's own engine is out of scope; this module speaks only the
//! surface named by the specification.

mod error;
mod memory;
mod postgres;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use serde_json::Value;

/// A single chunk write, idempotent under `(repository, file_path, start_line, end_line)`.
#[derive(Debug, Clone)]
pub struct ChunkWrite {
    pub repository: String,
    pub file_path: String,
    pub language: Option<String>,
    pub chunk_type: String,
    pub content: String,
    pub start_line: i32,
    pub end_line: i32,
    pub embedding: Vec<f64>,
    pub metadata: Value,
}

/// A single conversation write, idempotent under `(session, timestamp, content_hash)`.
#[derive(Debug, Clone)]
pub struct ConversationWrite {
    pub session: String,
    pub project: Option<String>,
    pub timestamp: i64,
    pub content_hash: String,
    pub user_message: String,
    pub assistant_message: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_chunk(&self, chunk: ChunkWrite) -> Result<(), StoreError>;

    async fn upsert_conversation(&self, conversation: ConversationWrite) -> Result<(), StoreError>;

    /// Count of rows written across both tables in the last hour, for the
    /// Metrics Aggregator's throughput figure.
    async fn rows_written_last_hour(&self) -> Result<u64, StoreError>;

    fn backend_name(&self) -> &'static str;
}
