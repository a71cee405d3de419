//! Durable stream substrate trait
//!
//! Defines the interface the rest of the core speaks against: an append-only
//! log of field maps with consumer-group reads, acknowledgement, pending
//! introspection, and stale-message reclamation. Implemented by a Redis
//! Streams backend for production and an in-memory backend for tests.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StreamError;

/// A single message read from a stream, with its substrate-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub id: String,
    pub fields: HashMap<String, String>,
    /// Number of times this message has been delivered (to any consumer).
    /// Used by the Worker Supervisor to cap retries at `max_retry_attempts`.
    pub delivery_count: u32,
}

/// Snapshot of a consumer group's pending-entries list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingSummary {
    pub total_pending: u64,
    pub min_idle_ms: u64,
    pub max_idle_ms: u64,
}

/// Where a newly created consumer group should start reading from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStart {
    /// Only messages appended after the group is created ("$" in Redis).
    NewOnly,
    /// Every message currently on the stream ("0" in Redis).
    Replay,
}

#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// Append a message to `stream_key`, trimming to approximately
    /// `approximate_cap` entries. Returns the assigned message id.
    async fn append(
        &self,
        stream_key: &str,
        fields: HashMap<String, String>,
        approximate_cap: u64,
    ) -> Result<String, StreamError>;

    /// Idempotent create-if-absent for a consumer group.
    async fn ensure_group(
        &self,
        stream_key: &str,
        group: &str,
        start: GroupStart,
    ) -> Result<(), StreamError>;

    /// Block up to `block_ms` for up to `count` messages never delivered to
    /// this group (the `>` cursor). Returns an empty vec on timeout.
    async fn read_group(
        &self,
        stream_key: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamMessage>, StreamError>;

    /// Idempotent: remove `message_id` from the group's pending set.
    async fn acknowledge(
        &self,
        stream_key: &str,
        group: &str,
        message_id: &str,
    ) -> Result<(), StreamError>;

    /// Summarize the group's pending-entries list.
    async fn pending_summary(
        &self,
        stream_key: &str,
        group: &str,
    ) -> Result<PendingSummary, StreamError>;

    /// Reassign up to `count` messages idle longer than `min_idle_ms` from
    /// any consumer in the group to `consumer`.
    async fn claim_stale(
        &self,
        stream_key: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<StreamMessage>, StreamError>;

    /// Total entry count currently on `stream_key`, for the Metrics
    /// Aggregator's per-stream length figure (§4.11). Returns 0 if the
    /// stream does not exist.
    async fn stream_len(&self, stream_key: &str) -> Result<u64, StreamError>;

    /// Backend name for logging/metrics.
    fn backend_name(&self) -> &'static str;
}
