//! Metrics Aggregator (§4.11)
//!
//! A periodic/on-demand snapshot of stream, status, and store state exposed
//! to the read layer. No storage of its own: every figure is derived from
//! the adapters at query time, except `last_save`, which the Auto-Save
//! Handler records directly since no adapter exposes "time of last write".

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};

use crate::core::constants::{AUTOSAVE_PENDING_ERROR_THRESHOLD, AUTOSAVE_PENDING_WARNING_THRESHOLD};
use crate::data::store::Store;
use crate::data::stream::{AUTOSAVE_CONSUMER_GROUP, StreamBackend, autosave_stream_key};
use crate::domain::indexing::JobState;
use crate::domain::indexing::status::StatusRecordStore;

/// Shared last-successful-save timestamp. The Auto-Save Handler records a
/// fresh value on every successful upsert (§4.9); the metrics snapshot reads
/// it back. A plain atomic is sufficient: writers never need to observe
/// each other's result, only the latest value.
#[derive(Default)]
pub struct LastSaveTracker {
    unix_secs: AtomicI64,
}

impl LastSaveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, unix_secs: i64) {
        self.unix_secs.store(unix_secs, Ordering::Relaxed);
    }

    pub fn get(&self) -> Option<i64> {
        match self.unix_secs.load(Ordering::Relaxed) {
            0 => None,
            secs => Some(secs),
        }
    }
}

/// Health classification for the conversations metrics endpoint (§6).
/// Thresholds: `pending > 50` -> error; `pending > 10` -> warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueHealth {
    Healthy,
    Warning,
    Error,
}

impl QueueHealth {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    fn from_pending(pending: u64) -> Self {
        if pending > AUTOSAVE_PENDING_ERROR_THRESHOLD {
            Self::Error
        } else if pending > AUTOSAVE_PENDING_WARNING_THRESHOLD {
            Self::Warning
        } else {
            Self::Healthy
        }
    }
}

/// A point-in-time snapshot of the auto-save queue (§6 `GET /v1/conversations/metrics`).
#[derive(Debug, Clone)]
pub struct ConversationMetrics {
    pub queue_size: u64,
    pub pending: u64,
    pub last_save: Option<DateTime<Utc>>,
    pub saves_per_hour: u64,
    pub status: &'static str,
}

pub struct MetricsAggregator {
    stream: Arc<dyn StreamBackend>,
    store: Arc<dyn Store>,
    status: Arc<StatusRecordStore>,
    last_save: Arc<LastSaveTracker>,
}

impl MetricsAggregator {
    pub fn new(
        stream: Arc<dyn StreamBackend>,
        store: Arc<dyn Store>,
        status: Arc<StatusRecordStore>,
        last_save: Arc<LastSaveTracker>,
    ) -> Self {
        Self {
            stream,
            store,
            status,
            last_save,
        }
    }

    /// Snapshot the auto-save queue for the conversations metrics endpoint.
    pub async fn conversation_metrics(&self) -> ConversationMetrics {
        let stream_key = autosave_stream_key();
        let queue_size = self.stream.stream_len(&stream_key).await.unwrap_or(0);
        let pending = self
            .stream
            .pending_summary(&stream_key, AUTOSAVE_CONSUMER_GROUP)
            .await
            .map(|summary| summary.total_pending)
            .unwrap_or(0);
        let saves_per_hour = self.store.rows_written_last_hour().await.unwrap_or(0);
        let last_save = self
            .last_save
            .get()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        ConversationMetrics {
            queue_size,
            pending,
            last_save,
            saves_per_hour,
            status: QueueHealth::from_pending(pending).as_str(),
        }
    }

    /// Indexing jobs bucketed by lifecycle state, an operator overview
    /// complementing the single-repository status endpoint (§6).
    pub async fn indexing_job_counts(&self) -> HashMap<&'static str, u64> {
        let mut counts: HashMap<&'static str, u64> = HashMap::new();
        let Ok(keys) = self.status.all_keys().await else {
            return counts;
        };
        for key in keys {
            let Some(repository) = key.strip_prefix(crate::data::status::STATUS_PREFIX) else {
                continue;
            };
            let Ok(Some(status)) = self.status.get(repository).await else {
                continue;
            };
            let label = state_label(status.state);
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }
}

fn state_label(state: JobState) -> &'static str {
    match state {
        JobState::Pending => "pending",
        JobState::Processing => "processing",
        JobState::Completed => "completed",
        JobState::CompletedWithErrors => "completed_with_errors",
        JobState::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::status::MemoryStatusBackend;
    use crate::data::store::MemoryStore;
    use crate::data::stream::MemoryStreamBackend;

    fn harness() -> MetricsAggregator {
        let stream: Arc<dyn StreamBackend> = Arc::new(MemoryStreamBackend::new());
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let status = Arc::new(StatusRecordStore::new(Arc::new(MemoryStatusBackend::new())));
        MetricsAggregator::new(stream, store, status, Arc::new(LastSaveTracker::new()))
    }

    #[tokio::test]
    async fn empty_queue_is_healthy_with_no_last_save() {
        let metrics = harness().conversation_metrics().await;
        assert_eq!(metrics.queue_size, 0);
        assert_eq!(metrics.pending, 0);
        assert!(metrics.last_save.is_none());
        assert_eq!(metrics.status, "healthy");
    }

    #[test]
    fn pending_threshold_classification_matches_spec() {
        assert_eq!(QueueHealth::from_pending(0), QueueHealth::Healthy);
        assert_eq!(QueueHealth::from_pending(11), QueueHealth::Warning);
        assert_eq!(QueueHealth::from_pending(51), QueueHealth::Error);
    }

    #[tokio::test]
    async fn job_counts_buckets_by_state() {
        let aggregator = harness();
        aggregator
            .status
            .init("job-1", "acme/a", 1, 1, JobState::Completed)
            .await
            .unwrap();
        aggregator
            .status
            .init("job-2", "acme/b", 1, 1, JobState::Processing)
            .await
            .unwrap();

        let counts = aggregator.indexing_job_counts().await;
        assert_eq!(counts.get("completed"), Some(&1));
        assert_eq!(counts.get("processing"), Some(&1));
    }
}
