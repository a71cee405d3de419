//! Status Record trait
//!
//! A mapping {field → string} per key (one Job Status Record per repository
//! label), with atomic integer increments and bulk field set. Expiry is
//! refreshed on every mutation so a record outlives its last write by
//! exactly the configured retention window.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StatusError;

#[async_trait]
pub trait StatusBackend: Send + Sync {
    /// Bulk-set fields on `key`, creating it if absent. Refreshes `ttl_seconds`.
    async fn set_many(
        &self,
        key: &str,
        fields: HashMap<String, String>,
        ttl_seconds: u64,
    ) -> Result<(), StatusError>;

    /// Atomically add `delta` to `field` on `key`, returning the new value.
    /// Refreshes `ttl_seconds`.
    async fn increment_field(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        ttl_seconds: u64,
    ) -> Result<i64, StatusError>;

    /// Append `entry` to the bounded error-log field, keeping at most
    /// `max_entries`. Refreshes `ttl_seconds`.
    async fn append_log(
        &self,
        key: &str,
        field: &str,
        entry: &str,
        max_entries: usize,
        ttl_seconds: u64,
    ) -> Result<(), StatusError>;

    /// Read all fields of `key`. Returns an empty map if the key is absent.
    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, StatusError>;

    /// Explicitly (re)set the TTL on `key` without mutating its fields.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), StatusError>;

    /// List keys matching `prefix`, for the watchdog sweep and metrics.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StatusError>;

    fn backend_name(&self) -> &'static str;
}
