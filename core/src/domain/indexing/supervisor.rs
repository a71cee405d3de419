//! Worker Supervisor (§4.8)
//!
//! Spawns the Isolated Worker as a subprocess per dequeued batch message,
//! enforces the per-batch timeout, classifies failures, and decides
//! acknowledge / leave-pending / halt-consumer.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::Instant;

use crate::core::constants::{
    DEFAULT_MAX_PROCESSING_TIME_SECS, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_WORKER_BIN,
    RETRY_BACKOFF_BASE_SECS, RETRY_BACKOFF_CAP_SECS, WORKER_KILL_GRACE_SECS,
};

use super::errors::{BatchError, classify_stderr};
use super::messages::BatchMessage;
use super::status::StatusRecordStore;
use super::worker::WorkerResult;

/// What the Consumer Loop should do with the dequeued message once the
/// Supervisor has classified the outcome (§4.8 step 8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Processed (even with some per-file errors) or the retry budget was
    /// exhausted: acknowledge and move on.
    Acknowledge,
    /// Retryable failure, budget remaining: leave pending for claim-stale.
    LeavePending { backoff: Duration },
    /// System-level failure: leave pending and halt the Consumer Loop.
    HaltConsumer { reason: BatchError },
}

pub struct WorkerSupervisor {
    status: Arc<StatusRecordStore>,
    worker_bin: String,
    postgres_url: String,
    timeout: Duration,
    max_retry_attempts: u32,
}

impl WorkerSupervisor {
    pub fn new(status: Arc<StatusRecordStore>, postgres_url: String) -> Self {
        Self {
            status,
            worker_bin: DEFAULT_WORKER_BIN.to_string(),
            postgres_url,
            timeout: Duration::from_secs(DEFAULT_MAX_PROCESSING_TIME_SECS),
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
        }
    }

    pub fn with_worker_bin(mut self, worker_bin: impl Into<String>) -> Self {
        self.worker_bin = worker_bin.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retry_attempts(mut self, max_retry_attempts: u32) -> Self {
        self.max_retry_attempts = max_retry_attempts;
        self
    }

    /// Run one dequeued batch message to completion and decide its
    /// disposition (§4.8 steps 1-8). `delivery_count` comes from the
    /// substrate's redelivery tracking.
    pub async fn handle(&self, message: &BatchMessage, delivery_count: u32) -> Disposition {
        let start = Instant::now();
        tracing::debug!(
            job_id = %message.job_id,
            repository = %message.repository,
            batch_number = message.batch_number,
            "dispatching batch to isolated worker"
        );

        let outcome = self.spawn_and_await(message).await;
        tracing::debug!(elapsed_ms = start.elapsed().as_millis(), "worker run finished");

        match outcome {
            Ok(result) => {
                let error_entries: Vec<String> = result
                    .per_file_errors
                    .unwrap_or_default()
                    .into_iter()
                    .take(50)
                    .collect();
                if let Err(e) = self
                    .status
                    .record_batch_result(
                        &message.repository,
                        result.success_count,
                        result.error_count,
                        &error_entries,
                    )
                    .await
                {
                    tracing::warn!(error = %e, "failed to record batch result");
                }
                Disposition::Acknowledge
            }
            Err(batch_error) => self.classify_failure(message, delivery_count, batch_error).await,
        }
    }

    async fn classify_failure(
        &self,
        message: &BatchMessage,
        delivery_count: u32,
        batch_error: BatchError,
    ) -> Disposition {
        if batch_error.is_stop_consumer() {
            return Disposition::HaltConsumer { reason: batch_error };
        }

        if delivery_count > self.max_retry_attempts {
            tracing::warn!(
                job_id = %message.job_id,
                batch_number = message.batch_number,
                attempts = delivery_count,
                "retry budget exhausted, recording permanent batch failure"
            );
            if let Err(e) = self
                .status
                .record_batch_failure(&message.repository, message.batch_number, batch_error.tag())
                .await
            {
                tracing::warn!(error = %e, "failed to record permanent batch failure");
            }
            return Disposition::Acknowledge;
        }

        let backoff = backoff_for_attempt(delivery_count);
        Disposition::LeavePending { backoff }
    }

    async fn spawn_and_await(&self, message: &BatchMessage) -> Result<WorkerResult, BatchError> {
        let mut command = Command::new(&self.worker_bin);
        command
            .arg("--repository")
            .arg(&message.repository)
            .arg("--db-url")
            .arg(&self.postgres_url)
            .arg("--files")
            .arg(message.files_arg())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| BatchError::SubprocessCrash(format!("spawn failed: {e}")))?;

        if tokio::time::timeout(self.timeout, child.wait()).await.is_err() {
            tracing::warn!("worker exceeded timeout, sending termination signal");
            let _ = child.start_kill();
            let _ = tokio::time::timeout(
                Duration::from_secs(WORKER_KILL_GRACE_SECS),
                child.wait(),
            )
            .await;
            return Err(BatchError::SubprocessTimeout);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BatchError::SubprocessCrash(format!("wait failed: {e}")))?;
        self.interpret_output(output)
    }

    fn interpret_output(
        &self,
        output: std::process::Output,
    ) -> Result<WorkerResult, BatchError> {
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_stderr(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let last_line = stdout.lines().filter(|l| !l.trim().is_empty()).next_back();
        let Some(last_line) = last_line else {
            return Err(BatchError::CriticalError("empty worker stdout".to_string()));
        };

        serde_json::from_str::<WorkerResult>(last_line)
            .map_err(|e| BatchError::CriticalError(format!("unparseable worker result: {e}")))
    }
}

/// `min(5 x 2^(attempt-1), 60)` seconds (§4.8 Backoff).
fn backoff_for_attempt(attempt: u32) -> Duration {
    let attempt = attempt.max(1);
    let scaled = RETRY_BACKOFF_BASE_SECS.saturating_mul(1u64 << (attempt - 1).min(63));
    Duration::from_secs(scaled.min(RETRY_BACKOFF_CAP_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_the_cap() {
        assert_eq!(backoff_for_attempt(1), Duration::from_secs(5));
        assert_eq!(backoff_for_attempt(2), Duration::from_secs(10));
        assert_eq!(backoff_for_attempt(3), Duration::from_secs(20));
        assert_eq!(backoff_for_attempt(4), Duration::from_secs(40));
        assert_eq!(backoff_for_attempt(5), Duration::from_secs(60));
        assert_eq!(backoff_for_attempt(10), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn retry_budget_exhausted_acknowledges_and_records_permanent_failure() {
        use crate::data::status::MemoryStatusBackend;

        let status = Arc::new(StatusRecordStore::new(Arc::new(MemoryStatusBackend::new())));
        status
            .init(
                "job-1",
                "acme/widgets",
                40,
                1,
                crate::domain::indexing::status::JobState::Processing,
            )
            .await
            .unwrap();
        let supervisor = WorkerSupervisor::new(status.clone(), "postgres://x".to_string())
            .with_max_retry_attempts(3);

        let message = BatchMessage {
            job_id: "job-1".to_string(),
            repository: "acme/widgets".to_string(),
            batch_number: 1,
            total_batches: 1,
            files: vec![],
            created_at: 0,
        };

        let disposition = supervisor
            .classify_failure(&message, 4, BatchError::SubprocessTimeout)
            .await;
        assert_eq!(disposition, Disposition::Acknowledge);

        let record = status.get("acme/widgets").await.unwrap().unwrap();
        assert_eq!(record.error_log.len(), 1);
    }

    #[tokio::test]
    async fn retryable_failure_within_budget_leaves_pending_with_backoff() {
        let status = Arc::new(StatusRecordStore::new(Arc::new(
            crate::data::status::MemoryStatusBackend::new(),
        )));
        let supervisor = WorkerSupervisor::new(status, "postgres://x".to_string())
            .with_max_retry_attempts(3);
        let message = BatchMessage {
            job_id: "job-1".to_string(),
            repository: "acme/widgets".to_string(),
            batch_number: 1,
            total_batches: 1,
            files: vec![],
            created_at: 0,
        };

        let disposition = supervisor
            .classify_failure(&message, 1, BatchError::DbConnectionError("x".to_string()))
            .await;
        assert_eq!(
            disposition,
            Disposition::LeavePending {
                backoff: Duration::from_secs(5)
            }
        );
    }

    #[tokio::test]
    async fn system_level_failure_halts_the_consumer() {
        let status = Arc::new(StatusRecordStore::new(Arc::new(
            crate::data::status::MemoryStatusBackend::new(),
        )));
        let supervisor = WorkerSupervisor::new(status, "postgres://x".to_string());
        let message = BatchMessage {
            job_id: "job-1".to_string(),
            repository: "acme/widgets".to_string(),
            batch_number: 1,
            total_batches: 1,
            files: vec![],
            created_at: 0,
        };

        let disposition = supervisor
            .classify_failure(&message, 1, BatchError::OutOfMemory("x".to_string()))
            .await;
        assert!(matches!(disposition, Disposition::HaltConsumer { .. }));
    }
}
