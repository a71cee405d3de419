//! In-memory stream substrate backend
//!
//! Local-only simulation of the Redis Streams semantics this crate relies
//! on: an ordered log, per-group delivery cursors, and a pending-entries
//! list per group. Suitable for unit tests and single-process development.
//! A process crash loses everything; for durability use the Redis backend.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::backend::{GroupStart, PendingSummary, StreamBackend, StreamMessage};
use super::error::StreamError;

struct Entry {
    id: u64,
    fields: HashMap<String, String>,
}

struct PendingEntry {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u32,
}

#[derive(Default)]
struct GroupState {
    /// Highest id already handed out via the `>` cursor.
    cursor: u64,
    pending: HashMap<u64, PendingEntry>,
}

#[derive(Default)]
struct StreamState {
    entries: VecDeque<Entry>,
    next_id: u64,
    groups: HashMap<String, GroupState>,
}

struct Shared {
    streams: Mutex<HashMap<String, StreamState>>,
    notifiers: Mutex<HashMap<String, Arc<Notify>>>,
}

/// In-memory implementation of [`StreamBackend`].
pub struct MemoryStreamBackend {
    shared: Arc<Shared>,
}

impl Default for MemoryStreamBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStreamBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                streams: Mutex::new(HashMap::new()),
                notifiers: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn notifier(&self, stream_key: &str) -> Arc<Notify> {
        let mut notifiers = self.shared.notifiers.lock();
        notifiers
            .entry(stream_key.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    fn drain_ready(
        &self,
        stream_key: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamMessage>, StreamError> {
        let mut streams = self.shared.streams.lock();
        let stream = streams
            .entry(stream_key.to_string())
            .or_insert_with(StreamState::default);
        let group_state = stream
            .groups
            .get_mut(group)
            .ok_or_else(|| StreamError::NoGroup {
                stream: stream_key.to_string(),
                group: group.to_string(),
            })?;

        let mut out = Vec::new();
        for entry in stream.entries.iter() {
            if out.len() >= count {
                break;
            }
            if entry.id > group_state.cursor {
                group_state.cursor = entry.id;
                group_state.pending.insert(
                    entry.id,
                    PendingEntry {
                        consumer: consumer.to_string(),
                        delivered_at: Instant::now(),
                        delivery_count: 1,
                    },
                );
                out.push(StreamMessage {
                    id: entry.id.to_string(),
                    fields: entry.fields.clone(),
                    delivery_count: 1,
                });
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl StreamBackend for MemoryStreamBackend {
    async fn append(
        &self,
        stream_key: &str,
        fields: HashMap<String, String>,
        approximate_cap: u64,
    ) -> Result<String, StreamError> {
        let id = {
            let mut streams = self.shared.streams.lock();
            let stream = streams
                .entry(stream_key.to_string())
                .or_insert_with(StreamState::default);
            stream.next_id += 1;
            let id = stream.next_id;
            stream.entries.push_back(Entry { id, fields });
            while stream.entries.len() as u64 > approximate_cap {
                stream.entries.pop_front();
            }
            id
        };
        self.notifier(stream_key).notify_waiters();
        Ok(id.to_string())
    }

    async fn ensure_group(
        &self,
        stream_key: &str,
        group: &str,
        start: GroupStart,
    ) -> Result<(), StreamError> {
        let mut streams = self.shared.streams.lock();
        let stream = streams
            .entry(stream_key.to_string())
            .or_insert_with(StreamState::default);
        stream.groups.entry(group.to_string()).or_insert_with(|| {
            let cursor = match start {
                GroupStart::NewOnly => stream.next_id,
                GroupStart::Replay => 0,
            };
            GroupState {
                cursor,
                pending: HashMap::new(),
            }
        });
        Ok(())
    }

    async fn read_group(
        &self,
        stream_key: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<StreamMessage>, StreamError> {
        let ready = self.drain_ready(stream_key, group, consumer, count)?;
        if !ready.is_empty() || block_ms == 0 {
            return Ok(ready);
        }

        let notify = self.notifier(stream_key);
        let _ = tokio::time::timeout(Duration::from_millis(block_ms), notify.notified()).await;
        self.drain_ready(stream_key, group, consumer, count)
    }

    async fn acknowledge(
        &self,
        stream_key: &str,
        group: &str,
        message_id: &str,
    ) -> Result<(), StreamError> {
        let id: u64 = message_id
            .parse()
            .map_err(|_| StreamError::Serialization(format!("bad message id {message_id}")))?;
        let mut streams = self.shared.streams.lock();
        if let Some(stream) = streams.get_mut(stream_key)
            && let Some(group_state) = stream.groups.get_mut(group)
        {
            group_state.pending.remove(&id);
        }
        Ok(())
    }

    async fn pending_summary(
        &self,
        stream_key: &str,
        group: &str,
    ) -> Result<PendingSummary, StreamError> {
        let streams = self.shared.streams.lock();
        let Some(stream) = streams.get(stream_key) else {
            return Ok(PendingSummary::default());
        };
        let Some(group_state) = stream.groups.get(group) else {
            return Ok(PendingSummary::default());
        };
        if group_state.pending.is_empty() {
            return Ok(PendingSummary::default());
        }
        let now = Instant::now();
        let mut min_idle = u64::MAX;
        let mut max_idle = 0u64;
        for entry in group_state.pending.values() {
            let idle = now.duration_since(entry.delivered_at).as_millis() as u64;
            min_idle = min_idle.min(idle);
            max_idle = max_idle.max(idle);
        }
        Ok(PendingSummary {
            total_pending: group_state.pending.len() as u64,
            min_idle_ms: min_idle,
            max_idle_ms: max_idle,
        })
    }

    async fn claim_stale(
        &self,
        stream_key: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<StreamMessage>, StreamError> {
        let mut streams = self.shared.streams.lock();
        let Some(stream) = streams.get_mut(stream_key) else {
            return Ok(Vec::new());
        };
        let by_id: HashMap<u64, HashMap<String, String>> = stream
            .entries
            .iter()
            .map(|e| (e.id, e.fields.clone()))
            .collect();
        let Some(group_state) = stream.groups.get_mut(group) else {
            return Ok(Vec::new());
        };

        let now = Instant::now();
        let mut candidates: Vec<u64> = group_state
            .pending
            .iter()
            .filter(|(_, entry)| {
                now.duration_since(entry.delivered_at).as_millis() as u64 >= min_idle_ms
            })
            .map(|(id, _)| *id)
            .collect();
        candidates.sort_unstable();
        candidates.truncate(count);

        let mut out = Vec::new();
        for id in candidates {
            // A claimed message whose payload was since trimmed cannot be
            // replayed; drop it from pending (matches lossy-under-backpressure
            // trimming behavior) and skip it.
            let Some(fields) = by_id.get(&id) else {
                group_state.pending.remove(&id);
                continue;
            };
            let entry = group_state.pending.get_mut(&id).unwrap();
            entry.consumer = consumer.to_string();
            entry.delivered_at = now;
            entry.delivery_count += 1;
            out.push(StreamMessage {
                id: id.to_string(),
                fields: fields.clone(),
                delivery_count: entry.delivery_count,
            });
        }
        Ok(out)
    }

    async fn stream_len(&self, stream_key: &str) -> Result<u64, StreamError> {
        let streams = self.shared.streams.lock();
        Ok(streams.get(stream_key).map(|s| s.entries.len() as u64).unwrap_or(0))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(n: u32) -> HashMap<String, String> {
        HashMap::from([("n".to_string(), n.to_string())])
    }

    #[tokio::test]
    async fn append_then_read_group_returns_in_order() {
        let backend = MemoryStreamBackend::new();
        backend
            .ensure_group("s", "g", GroupStart::NewOnly)
            .await
            .unwrap();
        backend.append("s", fields(1), 1000).await.unwrap();
        backend.append("s", fields(2), 1000).await.unwrap();

        let msgs = backend.read_group("s", "g", "c1", 10, 0).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].fields["n"], "1");
        assert_eq!(msgs[1].fields["n"], "2");
    }

    #[tokio::test]
    async fn acknowledged_message_is_not_redelivered() {
        let backend = MemoryStreamBackend::new();
        backend
            .ensure_group("s", "g", GroupStart::NewOnly)
            .await
            .unwrap();
        let id = backend.append("s", fields(1), 1000).await.unwrap();
        let msgs = backend.read_group("s", "g", "c1", 10, 0).await.unwrap();
        assert_eq!(msgs.len(), 1);
        backend.acknowledge("s", "g", &id).await.unwrap();

        let summary = backend.pending_summary("s", "g").await.unwrap();
        assert_eq!(summary.total_pending, 0);

        // A second read_group should not return the acked message again,
        // since the cursor has already advanced past it.
        let msgs2 = backend.read_group("s", "g", "c1", 10, 0).await.unwrap();
        assert!(msgs2.is_empty());
    }

    #[tokio::test]
    async fn acknowledge_is_idempotent() {
        let backend = MemoryStreamBackend::new();
        backend
            .ensure_group("s", "g", GroupStart::NewOnly)
            .await
            .unwrap();
        let id = backend.append("s", fields(1), 1000).await.unwrap();
        backend.read_group("s", "g", "c1", 10, 0).await.unwrap();
        backend.acknowledge("s", "g", &id).await.unwrap();
        // Second ack on the same id must not error.
        backend.acknowledge("s", "g", &id).await.unwrap();
    }

    #[tokio::test]
    async fn claim_stale_never_reclaims_before_min_idle() {
        let backend = MemoryStreamBackend::new();
        backend
            .ensure_group("s", "g", GroupStart::NewOnly)
            .await
            .unwrap();
        backend.append("s", fields(1), 1000).await.unwrap();
        backend.read_group("s", "g", "owner", 10, 0).await.unwrap();

        let claimed = backend
            .claim_stale("s", "g", "other", 60_000, 10)
            .await
            .unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn claim_stale_reassigns_after_min_idle() {
        let backend = MemoryStreamBackend::new();
        backend
            .ensure_group("s", "g", GroupStart::NewOnly)
            .await
            .unwrap();
        backend.append("s", fields(1), 1000).await.unwrap();
        backend.read_group("s", "g", "owner", 10, 0).await.unwrap();

        let claimed = backend.claim_stale("s", "g", "rescuer", 0, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn stream_len_counts_entries_and_respects_the_cap() {
        let backend = MemoryStreamBackend::new();
        assert_eq!(backend.stream_len("s").await.unwrap(), 0);
        backend.append("s", fields(1), 1000).await.unwrap();
        backend.append("s", fields(2), 1000).await.unwrap();
        assert_eq!(backend.stream_len("s").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn approximate_cap_trims_oldest() {
        let backend = MemoryStreamBackend::new();
        backend
            .ensure_group("s", "g", GroupStart::Replay)
            .await
            .unwrap();
        for i in 0..5 {
            backend.append("s", fields(i), 3).await.unwrap();
        }
        let msgs = backend.read_group("s", "g", "c1", 100, 0).await.unwrap();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].fields["n"], "2");
    }
}
