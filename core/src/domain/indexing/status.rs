//! Job Status Record (§3, §4.2)
//!
//! A typed view over the Status Record adapter's untyped field map, for one
//! repository label. Counters are mutated only via the adapter's atomic
//! increments; nothing here does a get-modify-set.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;

use crate::data::status::{
    DEFAULT_STATUS_TTL_SECONDS, MAX_ERROR_LOG_ENTRIES, StatusBackend, StatusError, status_key,
};

/// Lifecycle state of a Job Status Record (§3). `completed_with_errors`
/// refines spec.md's `completed` per §4.10's completion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl JobState {
    /// `completed`, `completed_with_errors`, and `failed` never transition
    /// back to `processing` (§3 invariants).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithErrors | Self::Failed
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for JobState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "completed_with_errors" => Ok(Self::CompletedWithErrors),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

/// A parsed snapshot of one repository's Job Status Record.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub job_id: String,
    pub repository: String,
    pub total_files: u64,
    pub total_batches: u64,
    pub processed_files: u64,
    pub failed_files: u64,
    pub current_batch: u64,
    pub state: JobState,
    pub start_timestamp: i64,
    pub last_mutation_timestamp: i64,
    pub completion_timestamp: Option<i64>,
    pub error_log: Vec<String>,
}

impl JobStatus {
    /// `"<processed+failed>/<total>"`, the derived field the status
    /// endpoint exposes (§6).
    pub fn progress(&self) -> String {
        format!(
            "{}/{}",
            self.processed_files + self.failed_files,
            self.total_files
        )
    }

    /// Values parse defensively: readers never trust that every field is a
    /// well-formed integer (§4.2).
    fn from_fields(repository: &str, fields: &HashMap<String, String>) -> Option<Self> {
        let job_id = fields.get("job_id")?.clone();
        let parse_u64 = |field: &str| -> u64 { fields.get(field).and_then(|v| v.parse().ok()).unwrap_or(0) };
        let state = fields
            .get("state")
            .and_then(|v| JobState::from_str(v).ok())
            .unwrap_or(JobState::Pending);
        let start_timestamp = fields
            .get("start_timestamp")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let last_mutation_timestamp = fields
            .get("last_mutation_timestamp")
            .and_then(|v| v.parse().ok())
            .unwrap_or(start_timestamp);
        let completion_timestamp = fields
            .get("completion_timestamp")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v > 0);
        let error_log = fields
            .get("error_log")
            .and_then(|v| serde_json::from_str(v).ok())
            .unwrap_or_default();

        Some(Self {
            job_id,
            repository: repository.to_string(),
            total_files: parse_u64("total_files"),
            total_batches: parse_u64("total_batches"),
            processed_files: parse_u64("processed_files"),
            failed_files: parse_u64("failed_files"),
            current_batch: parse_u64("current_batch"),
            state,
            start_timestamp,
            last_mutation_timestamp,
            completion_timestamp,
            error_log,
        })
    }
}

/// Typed operations over a repository's Job Status Record, backed by a
/// [`StatusBackend`].
pub struct StatusRecordStore {
    backend: Arc<dyn StatusBackend>,
    ttl_seconds: u64,
}

impl StatusRecordStore {
    pub fn new(backend: Arc<dyn StatusBackend>) -> Self {
        Self {
            backend,
            ttl_seconds: DEFAULT_STATUS_TTL_SECONDS,
        }
    }

    /// Initialize a fresh Job Status Record (Batch Producer step 4, §4.5).
    /// `initial_state` lets the zero-files short-circuit (§8 boundary
    /// behaviors) go straight to a terminal state.
    pub async fn init(
        &self,
        job_id: &str,
        repository: &str,
        total_files: u64,
        total_batches: u64,
        initial_state: JobState,
    ) -> Result<(), StatusError> {
        let now = Utc::now().timestamp();
        let mut fields = HashMap::from([
            ("job_id".to_string(), job_id.to_string()),
            ("total_files".to_string(), total_files.to_string()),
            ("total_batches".to_string(), total_batches.to_string()),
            ("processed_files".to_string(), "0".to_string()),
            ("failed_files".to_string(), "0".to_string()),
            ("current_batch".to_string(), "0".to_string()),
            ("state".to_string(), initial_state.to_string()),
            ("start_timestamp".to_string(), now.to_string()),
            ("last_mutation_timestamp".to_string(), now.to_string()),
            ("error_log".to_string(), "[]".to_string()),
        ]);
        if initial_state.is_terminal() {
            fields.insert("completion_timestamp".to_string(), now.to_string());
        }
        self.backend
            .set_many(&status_key(repository), fields, self.ttl_seconds)
            .await
    }

    pub async fn get(&self, repository: &str) -> Result<Option<JobStatus>, StatusError> {
        let fields = self.backend.get_all(&status_key(repository)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(JobStatus::from_fields(repository, &fields))
    }

    /// Whether a non-terminal job currently exists for `repository`, used by
    /// the Ingest Endpoint's conflict check (§4.3).
    pub async fn has_in_flight_job(&self, repository: &str) -> Result<bool, StatusError> {
        Ok(self
            .get(repository)
            .await?
            .map(|status| !status.state.is_terminal())
            .unwrap_or(false))
    }

    /// Apply one batch result: increment counters, advance `current_batch`,
    /// and append truncated per-file errors to the log (Worker Supervisor
    /// step 7, §4.8). Returns the fresh snapshot for the Completion Trigger.
    pub async fn record_batch_result(
        &self,
        repository: &str,
        success_count: u64,
        error_count: u64,
        error_entries: &[String],
    ) -> Result<JobStatus, StatusError> {
        let key = status_key(repository);
        self.backend
            .increment_field(&key, "processed_files", success_count as i64, self.ttl_seconds)
            .await?;
        self.backend
            .increment_field(&key, "failed_files", error_count as i64, self.ttl_seconds)
            .await?;
        self.backend
            .increment_field(&key, "current_batch", 1, self.ttl_seconds)
            .await?;
        self.backend
            .set_many(
                &key,
                HashMap::from([(
                    "last_mutation_timestamp".to_string(),
                    Utc::now().timestamp().to_string(),
                )]),
                self.ttl_seconds,
            )
            .await?;
        for entry in error_entries {
            self.backend
                .append_log(&key, "error_log", entry, MAX_ERROR_LOG_ENTRIES, self.ttl_seconds)
                .await?;
        }
        self.get(repository)
            .await?
            .ok_or_else(|| StatusError::Unavailable(format!("status record vanished for {repository}")))
    }

    /// Record a permanently-failed batch (retry budget exhausted, §4.8) or a
    /// system-level classification, without touching `processed_files`.
    pub async fn record_batch_failure(
        &self,
        repository: &str,
        batch_number: u32,
        tag: &str,
    ) -> Result<(), StatusError> {
        let key = status_key(repository);
        let entry = format!("batch {batch_number}: {tag}");
        self.backend
            .append_log(&key, "error_log", &entry, MAX_ERROR_LOG_ENTRIES, self.ttl_seconds)
            .await
    }

    /// Transition the record to `completed` or `completed_with_errors` and
    /// set the completion timestamp (§4.10). Idempotent: calling this on an
    /// already-terminal record is a silent no-op.
    pub async fn mark_terminal(
        &self,
        repository: &str,
        state: JobState,
    ) -> Result<(), StatusError> {
        debug_assert!(state.is_terminal());
        let now = Utc::now().timestamp();
        self.backend
            .set_many(
                &status_key(repository),
                HashMap::from([
                    ("state".to_string(), state.to_string()),
                    ("completion_timestamp".to_string(), now.to_string()),
                ]),
                self.ttl_seconds,
            )
            .await
    }

    /// Mark a stalled job `failed` with a stall entry, firing no downstream
    /// trigger (watchdog, §4.10).
    pub async fn mark_stalled(&self, repository: &str) -> Result<(), StatusError> {
        let key = status_key(repository);
        self.backend
            .append_log(
                &key,
                "error_log",
                "watchdog: job stalled, marked failed",
                MAX_ERROR_LOG_ENTRIES,
                self.ttl_seconds,
            )
            .await?;
        self.mark_terminal(repository, JobState::Failed).await
    }

    /// All Status Record keys, for the watchdog sweep and Metrics Aggregator.
    pub async fn all_keys(&self) -> Result<Vec<String>, StatusError> {
        self.backend
            .keys_with_prefix(crate::data::status::STATUS_PREFIX)
            .await
    }

    pub fn backend(&self) -> &Arc<dyn StatusBackend> {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::status::MemoryStatusBackend;

    fn store() -> StatusRecordStore {
        StatusRecordStore::new(Arc::new(MemoryStatusBackend::new()))
    }

    #[tokio::test]
    async fn init_then_get_round_trips() {
        let store = store();
        store
            .init("job-1", "acme/widgets", 100, 3, JobState::Pending)
            .await
            .unwrap();

        let status = store.get("acme/widgets").await.unwrap().unwrap();
        assert_eq!(status.job_id, "job-1");
        assert_eq!(status.total_files, 100);
        assert_eq!(status.total_batches, 3);
        assert_eq!(status.state, JobState::Pending);
        assert_eq!(status.progress(), "0/100");
    }

    #[tokio::test]
    async fn record_batch_result_accumulates_counters() {
        let store = store();
        store
            .init("job-1", "acme/widgets", 100, 3, JobState::Processing)
            .await
            .unwrap();

        store
            .record_batch_result("acme/widgets", 38, 2, &["SubprocessTimeout: batch 1".to_string()])
            .await
            .unwrap();
        let status = store.get("acme/widgets").await.unwrap().unwrap();
        assert_eq!(status.processed_files, 38);
        assert_eq!(status.failed_files, 2);
        assert_eq!(status.current_batch, 1);
        assert_eq!(status.error_log.len(), 1);
        assert!(status.last_mutation_timestamp >= status.start_timestamp);
    }

    #[tokio::test]
    async fn has_in_flight_job_is_false_once_terminal() {
        let store = store();
        store
            .init("job-1", "acme/widgets", 0, 0, JobState::Completed)
            .await
            .unwrap();
        assert!(!store.has_in_flight_job("acme/widgets").await.unwrap());
    }

    #[tokio::test]
    async fn has_in_flight_job_is_true_while_processing() {
        let store = store();
        store
            .init("job-1", "acme/widgets", 10, 1, JobState::Processing)
            .await
            .unwrap();
        assert!(store.has_in_flight_job("acme/widgets").await.unwrap());
    }

    #[tokio::test]
    async fn mark_terminal_sets_completion_timestamp() {
        let store = store();
        store
            .init("job-1", "acme/widgets", 10, 1, JobState::Processing)
            .await
            .unwrap();
        store
            .mark_terminal("acme/widgets", JobState::CompletedWithErrors)
            .await
            .unwrap();
        let status = store.get("acme/widgets").await.unwrap().unwrap();
        assert_eq!(status.state, JobState::CompletedWithErrors);
        assert!(status.completion_timestamp.is_some());
    }

    #[tokio::test]
    async fn get_on_missing_repository_returns_none() {
        let store = store();
        assert!(store.get("nope").await.unwrap().is_none());
    }
}
