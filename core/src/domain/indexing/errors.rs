//! Error Taxonomy & Retry Policy (§7)
//!
//! Batch-level failures reported by the Isolated Worker are classified from
//! its captured stderr by substring match, then handed to the Worker
//! Supervisor to decide acknowledge / leave-pending / halt-consumer.

use thiserror::Error;

/// Classification of an Isolated Worker failure at batch (message)
/// granularity. File-level errors never reach this type — they stay inside
/// the worker's `per_file_errors` and only affect counters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// Retryable: the worker did not exit within the configured timeout.
    #[error("worker exceeded its processing timeout")]
    SubprocessTimeout,

    /// Retryable: the worker exited non-zero for an unclassified process reason.
    #[error("worker process crashed: {0}")]
    SubprocessCrash(String),

    /// Retryable: the worker could not reach the store.
    #[error("worker could not reach the store: {0}")]
    DbConnectionError(String),

    /// System-level: halts the Consumer Loop (§7).
    #[error("worker reported out-of-memory: {0}")]
    OutOfMemory(String),

    /// System-level: halts the Consumer Loop. Covers stdout parse failures
    /// and any stderr that matches none of the known substrings.
    #[error("worker failed in an unclassified way: {0}")]
    CriticalError(String),
}

impl BatchError {
    /// Whether this classification is system-level and must halt the
    /// Consumer Loop rather than be retried message-by-message (§7).
    pub fn is_stop_consumer(&self) -> bool {
        matches!(self, Self::OutOfMemory(_) | Self::CriticalError(_))
    }

    /// Short tag recorded in the Status Record's error log and in metrics.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::SubprocessTimeout => "SubprocessTimeout",
            Self::SubprocessCrash(_) => "SubprocessCrash",
            Self::DbConnectionError(_) => "DbConnectionError",
            Self::OutOfMemory(_) => "OutOfMemory",
            Self::CriticalError(_) => "CriticalError",
        }
    }
}

/// Longest stderr excerpt kept in a classification or error-log entry.
const MAX_STDERR_EXCERPT: usize = 500;

fn excerpt(s: &str) -> String {
    let truncated: String = s.chars().take(MAX_STDERR_EXCERPT).collect();
    if truncated.len() < s.len() {
        format!("{truncated}...")
    } else {
        truncated
    }
}

/// Classify a non-zero-exit worker's stderr via substring match, in the
/// precedence order given in §7: timeout, then connection/database, then
/// memory/oom, then subprocess/process, else critical.
pub fn classify_stderr(stderr: &str) -> BatchError {
    let lower = stderr.to_lowercase();
    if lower.contains("timeout") {
        BatchError::SubprocessTimeout
    } else if lower.contains("connection") || lower.contains("database") {
        BatchError::DbConnectionError(excerpt(stderr))
    } else if lower.contains("memory") || lower.contains("oom") {
        BatchError::OutOfMemory(excerpt(stderr))
    } else if lower.contains("subprocess") || lower.contains("process") {
        BatchError::SubprocessCrash(excerpt(stderr))
    } else {
        BatchError::CriticalError(excerpt(stderr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_takes_precedence() {
        assert_eq!(
            classify_stderr("connection timeout while loading model"),
            BatchError::SubprocessTimeout
        );
    }

    #[test]
    fn connection_and_database_map_to_db_error() {
        assert!(matches!(
            classify_stderr("could not open database connection"),
            BatchError::DbConnectionError(_)
        ));
    }

    #[test]
    fn memory_and_oom_map_to_out_of_memory() {
        assert!(matches!(
            classify_stderr("fatal: out of memory (oom-killer)"),
            BatchError::OutOfMemory(_)
        ));
    }

    #[test]
    fn subprocess_and_process_map_to_crash() {
        assert!(matches!(
            classify_stderr("child process exited unexpectedly"),
            BatchError::SubprocessCrash(_)
        ));
    }

    #[test]
    fn unmatched_text_maps_to_critical() {
        assert!(matches!(
            classify_stderr("segmentation fault"),
            BatchError::CriticalError(_)
        ));
    }

    #[test]
    fn out_of_memory_and_critical_are_stop_consumer() {
        assert!(BatchError::OutOfMemory("x".into()).is_stop_consumer());
        assert!(BatchError::CriticalError("x".into()).is_stop_consumer());
        assert!(!BatchError::SubprocessTimeout.is_stop_consumer());
        assert!(!BatchError::SubprocessCrash("x".into()).is_stop_consumer());
        assert!(!BatchError::DbConnectionError("x".into()).is_stop_consumer());
    }

    #[test]
    fn excerpt_truncates_long_stderr() {
        let long = "x".repeat(1000);
        let BatchError::CriticalError(msg) = classify_stderr(&long) else {
            panic!("expected critical error");
        };
        assert!(msg.ends_with("..."));
        assert!(msg.len() <= MAX_STDERR_EXCERPT + 3);
    }
}
