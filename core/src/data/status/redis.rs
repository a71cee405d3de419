//! Redis hash implementation of [`StatusBackend`]
//!
//! Each Status Record is a Redis hash. Bulk field sets use `HSET`, counters
//! use `HINCRBY`, reads use `HGETALL`. The error-log field is a JSON array
//! string mutated through a Lua script so append-and-cap is atomic (mirrors
//! the teacher's atomic-`INCR`-plus-`PEXPIRE` cache script). TTL is
//! refreshed on every mutation via `EXPIRE`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Pool, Runtime};

use super::backend::StatusBackend;
use super::error::StatusError;

impl From<deadpool_redis::PoolError> for StatusError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        StatusError::Unavailable(e.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for StatusError {
    fn from(e: deadpool_redis::redis::RedisError) -> Self {
        StatusError::Unavailable(e.to_string())
    }
}

const APPEND_LOG_SCRIPT: &str = r#"
    local current = redis.call('HGET', KEYS[1], ARGV[1])
    local list
    if current then
        list = cjson.decode(current)
    else
        list = {}
    end
    table.insert(list, ARGV[2])
    local max_entries = tonumber(ARGV[3])
    while #list > max_entries do
        table.remove(list, 1)
    end
    redis.call('HSET', KEYS[1], ARGV[1], cjson.encode(list))
    redis.call('EXPIRE', KEYS[1], ARGV[4])
    return #list
"#;

pub struct RedisStatusBackend {
    pool: Pool,
}

impl RedisStatusBackend {
    pub async fn new(redis_url: &str) -> Result<Self, StatusError> {
        let mut config = Config::from_url(redis_url);
        config.pool = Some(deadpool_redis::PoolConfig {
            max_size: 32,
            timeouts: deadpool_redis::Timeouts {
                wait: Some(Duration::from_secs(5)),
                create: Some(Duration::from_secs(5)),
                recycle: Some(Duration::from_secs(5)),
            },
            ..Default::default()
        });
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StatusError::Unavailable(e.to_string()))?;

        let mut conn = pool.get().await?;
        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl StatusBackend for RedisStatusBackend {
    async fn set_many(
        &self,
        key: &str,
        fields: HashMap<String, String>,
        ttl_seconds: u64,
    ) -> Result<(), StatusError> {
        let mut conn = self.pool.get().await?;
        let pairs: Vec<(String, String)> = fields.into_iter().collect();
        let _: () = conn.hset_multiple(key, &pairs).await?;
        let _: () = conn.expire(key, ttl_seconds as i64).await?;
        Ok(())
    }

    async fn increment_field(
        &self,
        key: &str,
        field: &str,
        delta: i64,
        ttl_seconds: u64,
    ) -> Result<i64, StatusError> {
        let mut conn = self.pool.get().await?;
        let new_value: i64 = conn.hincr(key, field, delta).await?;
        let _: () = conn.expire(key, ttl_seconds as i64).await?;
        Ok(new_value)
    }

    async fn append_log(
        &self,
        key: &str,
        field: &str,
        entry: &str,
        max_entries: usize,
        ttl_seconds: u64,
    ) -> Result<(), StatusError> {
        let mut conn = self.pool.get().await?;
        let _: i64 = deadpool_redis::redis::cmd("EVAL")
            .arg(APPEND_LOG_SCRIPT)
            .arg(1)
            .arg(key)
            .arg(field)
            .arg(entry)
            .arg(max_entries)
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_all(&self, key: &str) -> Result<HashMap<String, String>, StatusError> {
        let mut conn = self.pool.get().await?;
        let fields: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(fields)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<(), StatusError> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.expire(key, ttl_seconds as i64).await?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StatusError> {
        let mut conn = self.pool.get().await?;
        let mut out = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = deadpool_redis::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(format!("{prefix}*"))
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            out.extend(keys);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(out)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
