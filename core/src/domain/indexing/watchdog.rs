//! Completion Trigger's watchdog sweep (§4.10)
//!
//! Runs periodically, independent of the Consumer Loop, and marks stalled
//! `processing` jobs `failed` without firing the post-processing hook.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::core::constants::{DEFAULT_WATCHDOG_INTERVAL_SECS, DEFAULT_WATCHDOG_STALL_IDLE_SECS};
use crate::core::shutdown::ShutdownService;

use super::status::{JobState, StatusRecordStore};

pub struct Watchdog {
    status: Arc<StatusRecordStore>,
    interval: Duration,
    stall_idle: Duration,
}

impl Watchdog {
    pub fn new(status: Arc<StatusRecordStore>) -> Self {
        Self {
            status,
            interval: Duration::from_secs(DEFAULT_WATCHDOG_INTERVAL_SECS),
            stall_idle: Duration::from_secs(DEFAULT_WATCHDOG_STALL_IDLE_SECS),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_stall_idle(mut self, stall_idle: Duration) -> Self {
        self.stall_idle = stall_idle;
        self
    }

    /// A single sweep pass: every `processing` job whose start timestamp
    /// predates the stall-idle threshold *and* whose counters have not
    /// advanced within that same window is marked `failed` (§4.10). A job
    /// that started long ago but is still actively incrementing
    /// `current_batch` is left alone. Returns the repository labels it
    /// stalled.
    pub async fn sweep_once(&self) -> Vec<String> {
        let mut stalled = Vec::new();
        let keys = match self.status.all_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "watchdog failed to list status records");
                return stalled;
            }
        };

        let now = Utc::now().timestamp();
        for key in keys {
            let Some(repository) = key.strip_prefix(crate::data::status::STATUS_PREFIX) else {
                continue;
            };
            let Ok(Some(status)) = self.status.get(repository).await else {
                continue;
            };
            if status.state != JobState::Processing {
                continue;
            }
            let age = now - status.start_timestamp;
            let idle = now - status.last_mutation_timestamp;
            let stall_idle_secs = self.stall_idle.as_secs() as i64;
            if age >= stall_idle_secs && idle >= stall_idle_secs {
                tracing::warn!(
                    repository,
                    age_secs = age,
                    idle_secs = idle,
                    "watchdog marking stalled job failed"
                );
                if self.status.mark_stalled(repository).await.is_ok() {
                    stalled.push(repository.to_string());
                }
            }
        }
        stalled
    }

    /// Run the sweep on a fixed interval until shutdown is triggered.
    pub async fn run(&self, shutdown: ShutdownService) {
        let mut ticker = tokio::time::interval(self.interval);
        let mut rx = shutdown.subscribe();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                _ = rx.changed() => {
                    if *rx.borrow() {
                        tracing::debug!("watchdog observed shutdown signal, exiting");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::status::MemoryStatusBackend;

    fn store() -> Arc<StatusRecordStore> {
        Arc::new(StatusRecordStore::new(Arc::new(MemoryStatusBackend::new())))
    }

    #[tokio::test]
    async fn stalled_processing_job_is_marked_failed() {
        let status = store();
        status
            .init("job-1", "acme/widgets", 10, 1, JobState::Processing)
            .await
            .unwrap();

        let watchdog = Watchdog::new(status.clone()).with_stall_idle(Duration::from_secs(0));
        let stalled = watchdog.sweep_once().await;
        assert_eq!(stalled, vec!["acme/widgets".to_string()]);

        let record = status.get("acme/widgets").await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert!(record.error_log.iter().any(|e| e.contains("stalled")));
    }

    #[tokio::test]
    async fn fresh_processing_job_is_left_alone() {
        let status = store();
        status
            .init("job-1", "acme/widgets", 10, 1, JobState::Processing)
            .await
            .unwrap();

        let watchdog = Watchdog::new(status.clone()).with_stall_idle(Duration::from_secs(900));
        let stalled = watchdog.sweep_once().await;
        assert!(stalled.is_empty());
    }

    #[tokio::test]
    async fn old_job_still_advancing_is_left_alone() {
        use crate::data::status::status_key;
        use std::collections::HashMap;

        let status = store();
        status
            .init("job-1", "acme/widgets", 10, 1, JobState::Processing)
            .await
            .unwrap();

        let old_start = chrono::Utc::now().timestamp() - 10_000;
        status
            .backend()
            .set_many(
                &status_key("acme/widgets"),
                HashMap::from([("start_timestamp".to_string(), old_start.to_string())]),
                24 * 60 * 60,
            )
            .await
            .unwrap();
        status
            .record_batch_result("acme/widgets", 1, 0, &[])
            .await
            .unwrap();

        let watchdog = Watchdog::new(status.clone()).with_stall_idle(Duration::from_secs(60));
        let stalled = watchdog.sweep_once().await;
        assert!(stalled.is_empty());
    }

    #[tokio::test]
    async fn terminal_job_is_never_touched() {
        let status = store();
        status
            .init("job-1", "acme/widgets", 10, 1, JobState::Completed)
            .await
            .unwrap();

        let watchdog = Watchdog::new(status.clone()).with_stall_idle(Duration::from_secs(0));
        let stalled = watchdog.sweep_once().await;
        assert!(stalled.is_empty());
    }
}
