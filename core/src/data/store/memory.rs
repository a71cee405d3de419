//! In-memory relational store for tests

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ChunkWrite, ConversationWrite, Store, StoreError};

struct WrittenRow {
    written_at: Instant,
}

#[derive(Default)]
struct State {
    chunk_keys: HashSet<(String, String, i32, i32)>,
    chunks: Vec<ChunkWrite>,
    conversation_keys: HashSet<(String, i64, String)>,
    conversations: Vec<ConversationWrite>,
    writes: Vec<WrittenRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_count(&self) -> usize {
        self.state.lock().chunks.len()
    }

    pub fn conversation_count(&self) -> usize {
        self.state.lock().conversations.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_chunk(&self, chunk: ChunkWrite) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let key = (
            chunk.repository.clone(),
            chunk.file_path.clone(),
            chunk.start_line,
            chunk.end_line,
        );
        if state.chunk_keys.insert(key.clone()) {
            state.chunks.push(chunk);
        } else if let Some(existing) = state.chunks.iter_mut().find(|c| {
            (
                c.repository.clone(),
                c.file_path.clone(),
                c.start_line,
                c.end_line,
            ) == key
        }) {
            *existing = chunk;
        }
        state.writes.push(WrittenRow {
            written_at: Instant::now(),
        });
        Ok(())
    }

    async fn upsert_conversation(&self, conversation: ConversationWrite) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let key = (
            conversation.session.clone(),
            conversation.timestamp,
            conversation.content_hash.clone(),
        );
        if state.conversation_keys.insert(key) {
            state.conversations.push(conversation);
            state.writes.push(WrittenRow {
                written_at: Instant::now(),
            });
        }
        Ok(())
    }

    async fn rows_written_last_hour(&self) -> Result<u64, StoreError> {
        let state = self.state.lock();
        let cutoff = Instant::now() - Duration::from_secs(3600);
        Ok(state.writes.iter().filter(|w| w.written_at >= cutoff).count() as u64)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(start_line: i32, end_line: i32) -> ChunkWrite {
        ChunkWrite {
            repository: "acme/widgets".to_string(),
            file_path: "src/lib.rs".to_string(),
            language: Some("rust".to_string()),
            chunk_type: "function".to_string(),
            content: "fn main() {}".to_string(),
            start_line,
            end_line,
            embedding: vec![0.1, 0.2, 0.3],
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn upsert_chunk_is_idempotent_under_natural_key() {
        let store = MemoryStore::new();
        store.upsert_chunk(chunk(1, 10)).await.unwrap();
        store.upsert_chunk(chunk(1, 10)).await.unwrap();
        assert_eq!(store.chunk_count(), 1);
    }

    #[tokio::test]
    async fn upsert_chunk_distinct_line_ranges_both_persist() {
        let store = MemoryStore::new();
        store.upsert_chunk(chunk(1, 10)).await.unwrap();
        store.upsert_chunk(chunk(11, 20)).await.unwrap();
        assert_eq!(store.chunk_count(), 2);
    }

    #[tokio::test]
    async fn upsert_conversation_is_idempotent_under_natural_key() {
        let store = MemoryStore::new();
        let conv = ConversationWrite {
            session: "s1".to_string(),
            project: None,
            timestamp: 1000,
            content_hash: "abc".to_string(),
            user_message: "hi".to_string(),
            assistant_message: "hello".to_string(),
        };
        store.upsert_conversation(conv.clone()).await.unwrap();
        store.upsert_conversation(conv).await.unwrap();
        assert_eq!(store.conversation_count(), 1);
    }
}
