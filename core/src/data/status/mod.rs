//! Status Record adapter
//!
//! One Job Status Record per repository label, stored as a hash of string
//! fields under `indexing:status:<repository>`.

mod backend;
mod error;
mod memory;
mod redis;

pub use backend::StatusBackend;
pub use error::StatusError;
pub use memory::MemoryStatusBackend;
pub use redis::RedisStatusBackend;

/// Status Record key prefix.
pub const STATUS_PREFIX: &str = "indexing:status:";

/// Status Record key for a repository label.
pub fn status_key(repository: &str) -> String {
    format!("{STATUS_PREFIX}{repository}")
}

/// Default retention window for a Status Record past its last mutation.
pub const DEFAULT_STATUS_TTL_SECONDS: u64 = 24 * 60 * 60;

/// Maximum number of entries retained in a Status Record's error log.
pub const MAX_ERROR_LOG_ENTRIES: usize = 100;
