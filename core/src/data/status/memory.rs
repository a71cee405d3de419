//! In-memory Status Record backend for tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::backend::StatusBackend;
use super::error::StatusError;

struct Record {
    fields: HashMap<String, String>,
    expires_at: Instant,
}

impl Record {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Default)]
pub struct MemoryStatusBackend {
    records: Arc<Mutex<HashMap<String, Record>>>,
}

impl MemoryStatusBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusBackend for MemoryStatusBackend {
    async fn set_many(
        &self,
        key: &str,
        fields: HashMap<String, String>,
        ttl_seconds: u64,
    ) -> Result<(), StatusError> {
        let mut records = self.records.lock();
        let record = records.entry(key.to_string()).or_insert_with(|| Record {
            fields: HashMap::new(),
            expires_at: Instant::now(),
        });
        record.fields.extend(fields);
        record.expires_at = Instant::now() + Duration::from_secs(ttl_seconds);
        Ok(())
    }

    async fn increment_field(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        ttl_seconds: u64,
    ) -> Result<i64, StatusError> {
        let mut records = self.records.lock();
        let record = records.entry(key.to_string()).or_insert_with(|| Record {
            fields: HashMap::new(),
            expires_at: Instant::now(),
        });
        let current: i64 = record
            .fields
            .get(field)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let updated = current + delta;
        record.fields.insert(field.to_string(), updated.to_string());
        record.expires_at = Instant::now() + Duration::from_secs(ttl_seconds);
        Ok(updated)
    }

    async fn append_log(
        &self,
        key: &str,
        field: &str,
        entry: &str,
        max_entries: usize,
        ttl_seconds: u64,
    ) -> Result<(), StatusError> {
        let mut records = self.records.lock();
        let record = records.entry(key.to_string()).or_insert_with(|| Record {
            fields: HashMap::new(),
            expires_at: Instant::now(),
        });
        let mut list: Vec<String> = record
            .fields
            .get(field)
            .and_then(|v| serde_json::from_str(v).ok())
            .unwrap_or_default();
        list.push(entry.to_string());
        while list.len() > max_entries {
            list.remove(0);
        }
        let serialized = serde_json::to_string(&list)
            .map_err(|e| StatusError::Serialization(e.to_string()))?;
        record.fields.insert(field.to_string(), serialized);
        record.expires_at = Instant::now() + Duration::from_secs(ttl_seconds);
        Ok(())
    }

    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, StatusError> {
        let mut records = self.records.lock();
        if let Some(record) = records.get(key)
            && record.is_expired()
        {
            records.remove(key);
        }
        Ok(records.get(key).map(|r| r.fields.clone()).unwrap_or_default())
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), StatusError> {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(key) {
            record.expires_at = Instant::now() + Duration::from_secs(ttl_seconds);
        }
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StatusError> {
        let records = self.records.lock();
        Ok(records
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_many_then_get_all_round_trips() {
        let backend = MemoryStatusBackend::new();
        backend
            .set_many(
                "job",
                HashMap::from([("state".to_string(), "pending".to_string())]),
                60,
            )
            .await
            .unwrap();
        let fields = backend.get_all("job").await.unwrap();
        assert_eq!(fields.get("state").unwrap(), "pending");
    }

    #[tokio::test]
    async fn increment_field_accumulates() {
        let backend = MemoryStatusBackend::new();
        backend.increment_field("job", "processed_files", 40, 60).await.unwrap();
        let total = backend
            .increment_field("job", "processed_files", 40, 60)
            .await
            .unwrap();
        assert_eq!(total, 80);
    }

    #[tokio::test]
    async fn append_log_caps_at_max_entries() {
        let backend = MemoryStatusBackend::new();
        for i in 0..5 {
            backend
                .append_log("job", "errors", &format!("entry-{i}"), 3, 60)
                .await
                .unwrap();
        }
        let fields = backend.get_all("job").await.unwrap();
        let list: Vec<String> = serde_json::from_str(fields.get("errors").unwrap()).unwrap();
        assert_eq!(list, vec!["entry-2", "entry-3", "entry-4"]);
    }

    #[tokio::test]
    async fn get_all_on_missing_key_returns_empty() {
        let backend = MemoryStatusBackend::new();
        let fields = backend.get_all("nonexistent").await.unwrap();
        assert!(fields.is_empty());
    }
}
