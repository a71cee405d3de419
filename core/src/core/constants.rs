//! Application-wide constants: identity, environment variable names, and
//! tunable defaults named throughout spec.md (batch size, timeouts, retry
//! budget, watchdog interval). Every default here is overridable by its
//! matching environment variable, per §6 "Default values baked into code
//! MUST be overridable by environment."

// =============================================================================
// Application Identity
// =============================================================================

pub const APP_NAME: &str = "Batchline";
pub const APP_NAME_LOWER: &str = "batchline";
pub const APP_DOT_FOLDER: &str = ".batchline";

// =============================================================================
// Configuration file / logging
// =============================================================================

pub const CONFIG_FILE_NAME: &str = "batchline.json";
pub const ENV_CONFIG: &str = "BATCHLINE_CONFIG";
pub const ENV_LOG: &str = "BATCHLINE_LOG";

// =============================================================================
// Server
// =============================================================================

pub const ENV_HOST: &str = "BATCHLINE_HOST";
pub const ENV_PORT: &str = "BATCHLINE_PORT";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8088;

/// HTTP body size limit for ingest endpoints (small JSON payloads only).
pub const INGEST_BODY_LIMIT: usize = 1024 * 1024;

// =============================================================================
// Backends
// =============================================================================

/// Durable stream substrate connection URL. Unset -> in-memory backend.
pub const ENV_REDIS_URL: &str = "BATCHLINE_REDIS_URL";
/// Relational store connection URL. Unset -> in-memory backend.
pub const ENV_POSTGRES_URL: &str = "BATCHLINE_POSTGRES_URL";

// =============================================================================
// Directory Scanner / Batch Producer (§4.4, §4.5)
// =============================================================================

pub const ENV_BATCH_SIZE: &str = "BATCHLINE_BATCH_SIZE";
/// Fixed batch size: the unit of enqueue and of worker invocation.
pub const DEFAULT_BATCH_SIZE: usize = 40;

pub const ENV_APPROXIMATE_CAP: &str = "BATCHLINE_STREAM_CAP";
/// Loose cap on stream length for memory bounding (§4.1 `approximate_cap`).
pub const DEFAULT_APPROXIMATE_CAP: u64 = 1000;

/// Directory substrings that exclude a path from the scan (§4.4).
pub const EXCLUDED_PATH_SUBSTRINGS: &[&str] = &["node_modules", "__tests__"];
/// Filename infix markers that exclude a file from the scan (§4.4).
pub const EXCLUDED_FILENAME_MARKERS: &[&str] = &[".test.", ".spec."];
/// Declaration-only file suffix, always excluded (§4.4).
pub const EXCLUDED_SUFFIX_DECLARATION: &str = ".d.ts";

/// Filename patterns classified as `CONFIG` (§4.4).
pub const CONFIG_FILENAME_PATTERNS: &[&str] = &[
    "package.json",
    "tsconfig.json",
    "Cargo.toml",
    ".eslintrc",
    "webpack.config.js",
    "vite.config.ts",
];

// =============================================================================
// Consumer Loop (§4.6)
// =============================================================================

pub const ENV_BLOCK_MS: &str = "BATCHLINE_BLOCK_MS";
/// Blocking `read_group` timeout.
pub const DEFAULT_BLOCK_MS: u64 = 5_000;

pub const ENV_PENDING_CHECK_INTERVAL_SECS: &str = "BATCHLINE_PENDING_CHECK_INTERVAL_SECS";
/// How often the Consumer Loop runs a claim-stale pass.
pub const DEFAULT_PENDING_CHECK_INTERVAL_SECS: u64 = 60;

pub const ENV_AUTOSAVE_CONCURRENCY: &str = "BATCHLINE_AUTOSAVE_CONCURRENCY";
/// Bounded concurrency for the auto-save pipeline within one replica.
pub const DEFAULT_AUTOSAVE_CONCURRENCY: usize = 4;

pub const ENV_SHUTDOWN_GRACE_SECS: &str = "BATCHLINE_SHUTDOWN_GRACE_SECS";
/// Cooperative-shutdown grace period (§5 Cancellation & timeouts).
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

// =============================================================================
// Worker Supervisor (§4.7, §4.8)
// =============================================================================

pub const ENV_WORKER_BIN: &str = "BATCHLINE_WORKER_BIN";
/// Worker binary name resolved on `PATH` when no override is given.
pub const DEFAULT_WORKER_BIN: &str = "batchline-worker";

pub const ENV_MAX_PROCESSING_TIME_SECS: &str = "BATCHLINE_MAX_PROCESSING_TIME_SECS";
/// Per-batch wall-clock timeout before the Supervisor classifies `SubprocessTimeout`.
pub const DEFAULT_MAX_PROCESSING_TIME_SECS: u64 = 300;

pub const ENV_MAX_RETRY_ATTEMPTS: &str = "BATCHLINE_MAX_RETRY_ATTEMPTS";
/// Retry budget before a batch-level failure is recorded as permanent.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Backoff base, in seconds: `min(BASE * 2^(attempt-1), CAP)` (§4.8).
pub const RETRY_BACKOFF_BASE_SECS: u64 = 5;
pub const RETRY_BACKOFF_CAP_SECS: u64 = 60;

/// Grace period after sending a termination signal before giving up on the
/// child process exiting on its own (§4.8 step 4).
pub const WORKER_KILL_GRACE_SECS: u64 = 5;

// =============================================================================
// Completion Trigger / Watchdog (§4.10)
// =============================================================================

pub const ENV_WATCHDOG_INTERVAL_SECS: &str = "BATCHLINE_WATCHDOG_INTERVAL_SECS";
pub const DEFAULT_WATCHDOG_INTERVAL_SECS: u64 = 5 * 60;

pub const ENV_WATCHDOG_STALL_IDLE_SECS: &str = "BATCHLINE_WATCHDOG_STALL_IDLE_SECS";
/// A `processing` job whose counters have not advanced in this long, and
/// whose start timestamp predates it, is marked `failed` by the watchdog.
pub const DEFAULT_WATCHDOG_STALL_IDLE_SECS: u64 = 15 * 60;

// =============================================================================
// Metrics Aggregator (§4.11, §6)
// =============================================================================

pub const ENV_METRICS_INTERVAL_SECS: &str = "BATCHLINE_METRICS_INTERVAL_SECS";
pub const DEFAULT_METRICS_INTERVAL_SECS: u64 = 10;

/// `pending > this` makes the conversations metrics `status` field "warning".
pub const AUTOSAVE_PENDING_WARNING_THRESHOLD: u64 = 10;
/// `pending > this` makes the conversations metrics `status` field "error".
pub const AUTOSAVE_PENDING_ERROR_THRESHOLD: u64 = 50;

// =============================================================================
// PostgreSQL pool defaults (grounded on the teacher's connection-pool adapter)
// =============================================================================

pub const POSTGRES_DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const POSTGRES_DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
pub const POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const POSTGRES_DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;
pub const POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_default_matches_spec() {
        assert_eq!(DEFAULT_BATCH_SIZE, 40);
    }

    #[test]
    fn retry_backoff_is_bounded() {
        assert_eq!(RETRY_BACKOFF_BASE_SECS, 5);
        assert_eq!(RETRY_BACKOFF_CAP_SECS, 60);
    }
}
