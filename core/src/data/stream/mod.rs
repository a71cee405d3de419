//! Durable stream substrate
//!
//! Stream keys follow the `{app}:stream:<name>` convention (hash-tagged for
//! Redis Cluster compatibility), matching the teacher's topic-prefix scheme.

mod backend;
mod error;
mod memory;
mod redis;

pub use backend::{GroupStart, PendingSummary, StreamBackend, StreamMessage};
pub use error::StreamError;
pub use memory::MemoryStreamBackend;
pub use redis::RedisStreamBackend;

/// Stream key prefix (hash tag for Redis Cluster).
pub const STREAM_PREFIX: &str = "{batchline}:stream:";

/// Stream key for a repository's indexing batch queue.
pub fn indexing_stream_key(repository: &str) -> String {
    format!("{STREAM_PREFIX}indexing:{repository}")
}

/// Stream key for the shared auto-save conversation queue.
pub fn autosave_stream_key() -> String {
    format!("{STREAM_PREFIX}autosave")
}

/// Consumer group name for indexing batch consumers.
pub const INDEXING_CONSUMER_GROUP: &str = "indexing-workers";

/// Consumer group name for auto-save consumers.
pub const AUTOSAVE_CONSUMER_GROUP: &str = "conversation-workers";
