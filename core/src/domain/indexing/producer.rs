//! Batch Producer (§4.5)
//!
//! Scans a repository's directory, initializes its Job Status Record, and
//! appends one batch message per shard to the indexing stream. No
//! transactional rollback across steps 4-6: a producer failure mid-enqueue
//! leaves the Status Record initialized with some messages missing, which
//! the completion watchdog (§4.10) surfaces for operator rerun.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::core::constants::{DEFAULT_APPROXIMATE_CAP, DEFAULT_BATCH_SIZE};
use crate::data::stream::{StreamBackend, StreamError, indexing_stream_key};

use super::messages::BatchMessage;
use super::scanner::DirectoryScanner;
use super::status::{JobState, StatusRecordStore};

/// Outcome of a batch-start request, the Ingest Endpoint's response body
/// (§6 `batch-start`).
#[derive(Debug, Clone)]
pub struct ProducedJob {
    pub job_id: String,
    pub total_files: u64,
    pub total_batches: u64,
    pub state: JobState,
}

pub struct BatchProducer {
    stream: Arc<dyn StreamBackend>,
    status: Arc<StatusRecordStore>,
    scanner: DirectoryScanner,
    batch_size: usize,
    approximate_cap: u64,
}

impl BatchProducer {
    pub fn new(stream: Arc<dyn StreamBackend>, status: Arc<StatusRecordStore>) -> Self {
        Self {
            stream,
            status,
            scanner: DirectoryScanner::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            approximate_cap: DEFAULT_APPROXIMATE_CAP,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_approximate_cap(mut self, approximate_cap: u64) -> Self {
        self.approximate_cap = approximate_cap;
        self
    }

    /// Run the full producer algorithm (§4.5 steps 1-6) for `repository`
    /// rooted at `directory`.
    pub async fn produce(
        &self,
        directory: &Path,
        repository: &str,
    ) -> Result<ProducedJob, StreamError> {
        let scanned = self
            .scanner
            .scan(directory)
            .map_err(|e| StreamError::Config(format!("directory scan failed: {e}")))?;
        let job_id = Uuid::new_v4().to_string();

        if scanned.is_empty() {
            self.status
                .init(&job_id, repository, 0, 0, JobState::Completed)
                .await
                .map_err(|e| StreamError::Connection(e.to_string()))?;
            return Ok(ProducedJob {
                job_id,
                total_files: 0,
                total_batches: 0,
                state: JobState::Completed,
            });
        }

        let batches = DirectoryScanner::shard(&scanned, self.batch_size);
        let total_files = scanned.len() as u64;
        let total_batches = batches.len() as u64;

        self.status
            .init(&job_id, repository, total_files, total_batches, JobState::Pending)
            .await
            .map_err(|e| StreamError::Connection(e.to_string()))?;

        let stream_key = indexing_stream_key(repository);
        let now = Utc::now().timestamp();
        for (index, files) in batches.into_iter().enumerate() {
            let message = BatchMessage {
                job_id: job_id.clone(),
                repository: repository.to_string(),
                batch_number: (index + 1) as u32,
                total_batches: total_batches as u32,
                files,
                created_at: now,
            };
            self.stream
                .append(&stream_key, message.into_fields(), self.approximate_cap)
                .await?;
        }

        Ok(ProducedJob {
            job_id,
            total_files,
            total_batches,
            state: JobState::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::status::MemoryStatusBackend;
    use crate::data::stream::{GroupStart, MemoryStreamBackend};
    use std::fs;

    fn touch(dir: &Path, rel: &str) {
        fs::write(dir.join(rel), "content").unwrap();
    }

    async fn harness() -> (BatchProducer, Arc<dyn StreamBackend>, Arc<StatusRecordStore>) {
        let stream: Arc<dyn StreamBackend> = Arc::new(MemoryStreamBackend::new());
        let status = Arc::new(StatusRecordStore::new(Arc::new(MemoryStatusBackend::new())));
        let producer = BatchProducer::new(stream.clone(), status.clone()).with_batch_size(2);
        (producer, stream, status)
    }

    #[tokio::test]
    async fn zero_files_short_circuits_to_completed_with_no_appends() {
        let temp = tempfile::tempdir().unwrap();
        let (producer, stream, status) = harness().await;

        let result = producer.produce(temp.path(), "acme/empty").await.unwrap();
        assert_eq!(result.total_files, 0);
        assert_eq!(result.state, JobState::Completed);

        let record = status.get("acme/empty").await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert!(record.completion_timestamp.is_some());

        let key = indexing_stream_key("acme/empty");
        stream.ensure_group(&key, "g", GroupStart::Replay).await.unwrap();
        let pending = stream.pending_summary(&key, "g").await.unwrap();
        assert_eq!(pending.total_pending, 0);
    }

    #[tokio::test]
    async fn enqueues_one_message_per_shard_in_order() {
        let temp = tempfile::tempdir().unwrap();
        for i in 0..5 {
            touch(temp.path(), &format!("f{i}.rs"));
        }
        let (producer, stream, status) = harness().await;

        let result = producer.produce(temp.path(), "acme/widgets").await.unwrap();
        assert_eq!(result.total_files, 5);
        assert_eq!(result.total_batches, 3);
        assert_eq!(result.state, JobState::Pending);

        let record = status.get("acme/widgets").await.unwrap().unwrap();
        assert_eq!(record.total_files, 5);
        assert_eq!(record.total_batches, 3);
        assert_eq!(record.state, JobState::Pending);

        let key = indexing_stream_key("acme/widgets");
        stream.ensure_group(&key, "g", GroupStart::Replay).await.unwrap();
        let messages = stream.read_group(&key, "g", "c1", 10, 0).await.unwrap();
        assert_eq!(messages.len(), 3);
        let batch_numbers: Vec<String> = messages
            .iter()
            .map(|m| m.fields.get("batch_number").unwrap().clone())
            .collect();
        assert_eq!(batch_numbers, vec!["1", "2", "3"]);
    }
}
