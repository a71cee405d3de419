//! Consumer Loop (§4.6)
//!
//! One long-running routine per replica: single-threaded cooperative
//! dispatch of batch-stream messages (each spawns a heavyweight subprocess,
//! so there is no benefit to parallelizing them from one consumer), plus a
//! bounded-concurrency pipeline over the shared auto-save stream. Grounded
//! directly on the teacher's `TracePipeline::start` consumer-group loop:
//! batching, `tokio::select!` over recv/shutdown/claim-interval, drain on
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::core::constants::{
    DEFAULT_AUTOSAVE_CONCURRENCY, DEFAULT_BLOCK_MS, DEFAULT_MAX_PROCESSING_TIME_SECS,
    DEFAULT_PENDING_CHECK_INTERVAL_SECS,
};
use crate::core::shutdown::ShutdownService;
use crate::data::stream::{
    AUTOSAVE_CONSUMER_GROUP, GroupStart, INDEXING_CONSUMER_GROUP, StreamBackend, StreamError,
    StreamMessage, autosave_stream_key, indexing_stream_key,
};
use crate::domain::autosave::{AutoSaveHandler, AutoSaveOutcome};

use super::messages::BatchMessage;
use super::status::{JobState, StatusRecordStore};
use super::supervisor::{Disposition, WorkerSupervisor};

/// Stable identity for this replica within the consumer group (§4.6 step 2).
pub fn consumer_name() -> String {
    let host = hostname_best_effort();
    format!("{host}-{}", uuid::Uuid::new_v4().simple())
}

fn hostname_best_effort() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "consumer".to_string())
}

pub struct ConsumerLoop {
    stream: Arc<dyn StreamBackend>,
    status: Arc<StatusRecordStore>,
    supervisor: WorkerSupervisor,
    autosave: AutoSaveHandler,
    consumer: String,
    block_ms: u64,
    pending_check_interval: Duration,
    autosave_concurrency: usize,
    min_idle_ms: u64,
    halted: std::sync::atomic::AtomicBool,
}

impl ConsumerLoop {
    pub fn new(
        stream: Arc<dyn StreamBackend>,
        status: Arc<StatusRecordStore>,
        supervisor: WorkerSupervisor,
        autosave: AutoSaveHandler,
    ) -> Self {
        Self {
            stream,
            status,
            supervisor,
            autosave,
            consumer: consumer_name(),
            block_ms: DEFAULT_BLOCK_MS,
            pending_check_interval: Duration::from_secs(DEFAULT_PENDING_CHECK_INTERVAL_SECS),
            autosave_concurrency: DEFAULT_AUTOSAVE_CONCURRENCY,
            min_idle_ms: DEFAULT_MAX_PROCESSING_TIME_SECS * 2 * 1000,
            halted: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn with_block_ms(mut self, block_ms: u64) -> Self {
        self.block_ms = block_ms;
        self
    }

    pub fn with_pending_check_interval(mut self, interval: Duration) -> Self {
        self.pending_check_interval = interval;
        self
    }

    pub fn with_autosave_concurrency(mut self, concurrency: usize) -> Self {
        self.autosave_concurrency = concurrency.max(1);
        self
    }

    pub fn with_min_idle_ms(mut self, min_idle_ms: u64) -> Self {
        self.min_idle_ms = min_idle_ms;
        self
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Unwrap a `read_group`/`claim_stale` result, halting the loop on a
    /// `SubstrateUnavailable` failure rather than treating it as "no
    /// messages" (§7 System-level taxonomy: the substrate being unreachable
    /// is stop-consumer, same as an `OutOfMemory`/`CriticalError` batch
    /// disposition).
    fn unwrap_stream_result(&self, result: Result<Vec<StreamMessage>, StreamError>) -> Vec<StreamMessage> {
        match result {
            Ok(messages) => messages,
            Err(e) if e.is_substrate_unavailable() => {
                tracing::error!(error = %e, "stream substrate unavailable, halting consumer loop");
                self.halted.store(true, std::sync::atomic::Ordering::SeqCst);
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "stream read failed");
                Vec::new()
            }
        }
    }

    /// Every repository with a non-terminal Job Status Record: the set of
    /// indexing streams this replica should currently be polling.
    async fn active_repositories(&self) -> Vec<String> {
        let keys = match self.status.all_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list status records");
                return Vec::new();
            }
        };
        let mut repositories = Vec::new();
        for key in keys {
            let Some(repository) = key.strip_prefix(crate::data::status::STATUS_PREFIX) else {
                continue;
            };
            if let Ok(Some(status)) = self.status.get(repository).await
                && !status.state.is_terminal()
            {
                repositories.push(repository.to_string());
            }
        }
        repositories
    }

    /// Run until shutdown is triggered or a system-level failure halts the
    /// loop (§4.6, §7).
    pub async fn run(&self, shutdown: ShutdownService) {
        self.stream
            .ensure_group(&autosave_stream_key(), AUTOSAVE_CONSUMER_GROUP, GroupStart::NewOnly)
            .await
            .ok();

        let mut rx = shutdown.subscribe();
        let mut claim_ticker = tokio::time::interval(self.pending_check_interval);

        loop {
            if self.is_halted() || *rx.borrow() {
                tracing::debug!("consumer loop exiting");
                break;
            }

            tokio::select! {
                _ = rx.changed() => {
                    if *rx.borrow() {
                        tracing::debug!("consumer loop observed shutdown signal, finishing current work");
                        break;
                    }
                }
                _ = claim_ticker.tick() => {
                    self.claim_stale_pass().await;
                }
                _ = self.poll_once() => {}
            }
        }
    }

    /// One dispatch round: drain any available batch work for active
    /// repositories, then a bounded slice of auto-save messages.
    async fn poll_once(&self) {
        let repositories = self.active_repositories().await;
        let mut dispatched_batch = false;

        for repository in repositories {
            if self.is_halted() {
                return;
            }
            let stream_key = indexing_stream_key(&repository);
            if self
                .stream
                .ensure_group(&stream_key, INDEXING_CONSUMER_GROUP, GroupStart::Replay)
                .await
                .is_err()
            {
                continue;
            }
            let result = self
                .stream
                .read_group(&stream_key, INDEXING_CONSUMER_GROUP, &self.consumer, 1, 0)
                .await;
            let messages = self.unwrap_stream_result(result);
            for message in messages {
                dispatched_batch = true;
                self.dispatch_batch_message(&stream_key, &message).await;
                if self.is_halted() {
                    return;
                }
            }
        }

        if self.is_halted() {
            return;
        }

        let block_ms = if dispatched_batch { 0 } else { self.block_ms };
        let autosave_key = autosave_stream_key();
        let result = self
            .stream
            .read_group(
                &autosave_key,
                AUTOSAVE_CONSUMER_GROUP,
                &self.consumer,
                self.autosave_concurrency,
                block_ms,
            )
            .await;
        let messages = self.unwrap_stream_result(result);
        if !messages.is_empty() {
            self.dispatch_autosave_messages(&autosave_key, messages).await;
        }
    }

    /// Run the Worker Supervisor over one dequeued batch message and apply
    /// its disposition (§4.8 step 8).
    async fn dispatch_batch_message(&self, stream_key: &str, message: &StreamMessage) {
        let Some(batch) = BatchMessage::from_fields(&message.fields) else {
            tracing::warn!(id = %message.id, "dropping unparseable batch message");
            let _ = self
                .stream
                .acknowledge(stream_key, INDEXING_CONSUMER_GROUP, &message.id)
                .await;
            return;
        };

        let disposition = self.supervisor.handle(&batch, message.delivery_count).await;
        self.apply_completion_trigger(&batch.repository).await;
        self.apply_disposition(stream_key, &message.id, disposition).await;
    }

    /// Act on a Worker Supervisor disposition (§4.8 step 8): acknowledge,
    /// delay the retry by the computed backoff, or halt the loop.
    async fn apply_disposition(&self, stream_key: &str, message_id: &str, disposition: Disposition) {
        match disposition {
            Disposition::Acknowledge => {
                let _ = self
                    .stream
                    .acknowledge(stream_key, INDEXING_CONSUMER_GROUP, message_id)
                    .await;
            }
            Disposition::LeavePending { backoff } => {
                tracing::debug!(backoff_secs = backoff.as_secs(), "leaving batch message pending");
                tokio::time::sleep(backoff).await;
            }
            Disposition::HaltConsumer { reason } => {
                tracing::error!(error = %reason, "system-level failure, halting consumer loop");
                self.halted.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }
    }

    /// Check the Completion Trigger (§4.10) after a batch result lands and
    /// transition the job if it just became terminal.
    async fn apply_completion_trigger(&self, repository: &str) {
        let Ok(Some(status)) = self.status.get(repository).await else {
            return;
        };
        if status.state.is_terminal() {
            return;
        }
        if status.processed_files + status.failed_files >= status.total_files {
            let terminal = if status.failed_files == 0 {
                JobState::Completed
            } else {
                JobState::CompletedWithErrors
            };
            if let Err(e) = self.status.mark_terminal(repository, terminal).await {
                tracing::warn!(error = %e, "failed to mark job terminal");
                return;
            }
            tracing::info!(repository, state = %terminal, "job reached terminal state");
            fire_post_processing_hook(repository);
        }
    }

    async fn dispatch_autosave_messages(&self, stream_key: &str, messages: Vec<StreamMessage>) {
        let semaphore = Arc::new(Semaphore::new(self.autosave_concurrency));
        let mut handles = Vec::with_capacity(messages.len());
        for message in messages {
            let semaphore = semaphore.clone();
            let stream = self.stream.clone();
            let autosave = self.autosave.clone();
            let stream_key = stream_key.to_string();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = autosave.handle(&message.fields).await;
                if outcome == AutoSaveOutcome::Acknowledge {
                    let _ = stream
                        .acknowledge(&stream_key, AUTOSAVE_CONSUMER_GROUP, &message.id)
                        .await;
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn claim_stale_pass(&self) {
        let repositories = self.active_repositories().await;
        for repository in repositories {
            if self.is_halted() {
                return;
            }
            let stream_key = indexing_stream_key(&repository);
            let result = self
                .stream
                .claim_stale(&stream_key, INDEXING_CONSUMER_GROUP, &self.consumer, self.min_idle_ms, 10)
                .await;
            let reclaimed = self.unwrap_stream_result(result);
            for message in reclaimed {
                self.dispatch_batch_message(&stream_key, &message).await;
                if self.is_halted() {
                    return;
                }
            }
        }

        if self.is_halted() {
            return;
        }

        let autosave_key = autosave_stream_key();
        let result = self
            .stream
            .claim_stale(
                &autosave_key,
                AUTOSAVE_CONSUMER_GROUP,
                &self.consumer,
                self.min_idle_ms,
                self.autosave_concurrency,
            )
            .await;
        let reclaimed = self.unwrap_stream_result(result);
        if !reclaimed.is_empty() {
            self.dispatch_autosave_messages(&autosave_key, reclaimed).await;
        }
    }
}

/// Idempotent downstream operation fired once a job reaches a terminal
/// state (§4.10). A no-op placeholder: the store already absorbed every
/// write during processing, so there is nothing further to commit here.
fn fire_post_processing_hook(repository: &str) {
    tracing::debug!(repository, "post-processing hook fired");
}
