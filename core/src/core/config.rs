use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_APPROXIMATE_CAP, DEFAULT_AUTOSAVE_CONCURRENCY,
    DEFAULT_BATCH_SIZE, DEFAULT_BLOCK_MS, DEFAULT_HOST, DEFAULT_MAX_PROCESSING_TIME_SECS,
    DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_PENDING_CHECK_INTERVAL_SECS, DEFAULT_PORT,
    DEFAULT_SHUTDOWN_GRACE_SECS, DEFAULT_WATCHDOG_INTERVAL_SECS, DEFAULT_WATCHDOG_STALL_IDLE_SECS,
    DEFAULT_WORKER_BIN, POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS, POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS,
    POSTGRES_DEFAULT_MAX_CONNECTIONS, POSTGRES_DEFAULT_MAX_LIFETIME_SECS,
    POSTGRES_DEFAULT_MIN_CONNECTIONS, POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
};

// =============================================================================
// File Config (JSON, optional, lowest non-default precedence layer)
// =============================================================================

/// `server` section of the JSON config file
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// `indexing` section of the JSON config file (§4.4/§4.5/§4.7/§4.8)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct IndexingFileConfig {
    pub batch_size: Option<usize>,
    pub approximate_cap: Option<u64>,
    pub worker_bin: Option<String>,
    pub max_processing_time_secs: Option<u64>,
    pub max_retry_attempts: Option<u32>,
}

/// `consumer` section of the JSON config file (§4.6, §5)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConsumerFileConfig {
    pub block_ms: Option<u64>,
    pub pending_check_interval_secs: Option<u64>,
    pub autosave_concurrency: Option<usize>,
    pub shutdown_grace_secs: Option<u64>,
}

/// `watchdog` section of the JSON config file (§4.10)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct WatchdogFileConfig {
    pub interval_secs: Option<u64>,
    pub stall_idle_secs: Option<u64>,
}

/// `backends` section of the JSON config file
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BackendsFileConfig {
    pub redis_url: Option<String>,
    pub postgres_url: Option<String>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub indexing: Option<IndexingFileConfig>,
    pub consumer: Option<ConsumerFileConfig>,
    pub watchdog: Option<WatchdogFileConfig>,
    pub backends: Option<BackendsFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(server) = other.server {
            let current = self.server.get_or_insert_with(ServerFileConfig::default);
            if server.host.is_some() {
                current.host = server.host;
            }
            if server.port.is_some() {
                current.port = server.port;
            }
        }

        if let Some(indexing) = other.indexing {
            let current = self
                .indexing
                .get_or_insert_with(IndexingFileConfig::default);
            if indexing.batch_size.is_some() {
                current.batch_size = indexing.batch_size;
            }
            if indexing.approximate_cap.is_some() {
                current.approximate_cap = indexing.approximate_cap;
            }
            if indexing.worker_bin.is_some() {
                current.worker_bin = indexing.worker_bin;
            }
            if indexing.max_processing_time_secs.is_some() {
                current.max_processing_time_secs = indexing.max_processing_time_secs;
            }
            if indexing.max_retry_attempts.is_some() {
                current.max_retry_attempts = indexing.max_retry_attempts;
            }
        }

        if let Some(consumer) = other.consumer {
            let current = self
                .consumer
                .get_or_insert_with(ConsumerFileConfig::default);
            if consumer.block_ms.is_some() {
                current.block_ms = consumer.block_ms;
            }
            if consumer.pending_check_interval_secs.is_some() {
                current.pending_check_interval_secs = consumer.pending_check_interval_secs;
            }
            if consumer.autosave_concurrency.is_some() {
                current.autosave_concurrency = consumer.autosave_concurrency;
            }
            if consumer.shutdown_grace_secs.is_some() {
                current.shutdown_grace_secs = consumer.shutdown_grace_secs;
            }
        }

        if let Some(watchdog) = other.watchdog {
            let current = self
                .watchdog
                .get_or_insert_with(WatchdogFileConfig::default);
            if watchdog.interval_secs.is_some() {
                current.interval_secs = watchdog.interval_secs;
            }
            if watchdog.stall_idle_secs.is_some() {
                current.stall_idle_secs = watchdog.stall_idle_secs;
            }
        }

        if let Some(backends) = other.backends {
            let current = self
                .backends
                .get_or_insert_with(BackendsFileConfig::default);
            if backends.redis_url.is_some() {
                current.redis_url = backends.redis_url;
            }
            if backends.postgres_url.is_some() {
                current.postgres_url = backends.postgres_url;
            }
        }
    }
}

/// Path to the profile-wide config file (`~/.batchline/batchline.json`)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

// =============================================================================
// Runtime Config (final, merged)
// =============================================================================

/// Server bind configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Directory Scanner / Batch Producer / Worker Supervisor tunables
#[derive(Debug, Clone)]
pub struct IndexingConfig {
    pub batch_size: usize,
    pub approximate_cap: u64,
    pub worker_bin: String,
    pub max_processing_time_secs: u64,
    pub max_retry_attempts: u32,
}

/// Consumer Loop tunables (§4.6, §5)
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub block_ms: u64,
    pub pending_check_interval_secs: u64,
    pub autosave_concurrency: usize,
    pub shutdown_grace_secs: u64,
}

/// Completion Trigger watchdog tunables (§4.10)
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub interval_secs: u64,
    pub stall_idle_secs: u64,
}

/// PostgreSQL connection pool configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to keep warm
    pub min_connections: u32,
    /// Connection acquire timeout in seconds
    pub acquire_timeout_secs: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,
    /// Max connection lifetime in seconds
    pub max_lifetime_secs: u64,
    /// Statement timeout in seconds (0 = disabled)
    pub statement_timeout_secs: u64,
}

/// Backend selection: which adapter implementations to construct. A `None`
/// URL selects the in-memory backend (development / tests); `Some` selects
/// the durable backend.
#[derive(Debug, Clone)]
pub struct BackendsConfig {
    pub redis_url: Option<String>,
    pub postgres: Option<PostgresConfig>,
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub indexing: IndexingConfig,
    pub consumer: ConsumerConfig,
    pub watchdog: WatchdogConfig,
    pub backends: BackendsConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Built-in defaults
    /// 2. Profile directory config (`~/.batchline/batchline.json`)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include environment variable fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let file_server = file_config.server.unwrap_or_default();
        let file_indexing = file_config.indexing.unwrap_or_default();
        let file_consumer = file_config.consumer.unwrap_or_default();
        let file_watchdog = file_config.watchdog.unwrap_or_default();
        let file_backends = file_config.backends.unwrap_or_default();

        let server = ServerConfig {
            host: cli
                .host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT),
        };

        let indexing = IndexingConfig {
            batch_size: cli
                .batch_size
                .or(file_indexing.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
            approximate_cap: cli
                .approximate_cap
                .or(file_indexing.approximate_cap)
                .unwrap_or(DEFAULT_APPROXIMATE_CAP),
            worker_bin: cli
                .worker_bin
                .clone()
                .or(file_indexing.worker_bin)
                .unwrap_or_else(|| DEFAULT_WORKER_BIN.to_string()),
            max_processing_time_secs: cli
                .max_processing_time_secs
                .or(file_indexing.max_processing_time_secs)
                .unwrap_or(DEFAULT_MAX_PROCESSING_TIME_SECS),
            max_retry_attempts: cli
                .max_retry_attempts
                .or(file_indexing.max_retry_attempts)
                .unwrap_or(DEFAULT_MAX_RETRY_ATTEMPTS),
        };

        let consumer = ConsumerConfig {
            block_ms: cli
                .block_ms
                .or(file_consumer.block_ms)
                .unwrap_or(DEFAULT_BLOCK_MS),
            pending_check_interval_secs: cli
                .pending_check_interval_secs
                .or(file_consumer.pending_check_interval_secs)
                .unwrap_or(DEFAULT_PENDING_CHECK_INTERVAL_SECS),
            autosave_concurrency: cli
                .autosave_concurrency
                .or(file_consumer.autosave_concurrency)
                .unwrap_or(DEFAULT_AUTOSAVE_CONCURRENCY),
            shutdown_grace_secs: cli
                .shutdown_grace_secs
                .or(file_consumer.shutdown_grace_secs)
                .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
        };

        let watchdog = WatchdogConfig {
            interval_secs: cli
                .watchdog_interval_secs
                .or(file_watchdog.interval_secs)
                .unwrap_or(DEFAULT_WATCHDOG_INTERVAL_SECS),
            stall_idle_secs: cli
                .watchdog_stall_idle_secs
                .or(file_watchdog.stall_idle_secs)
                .unwrap_or(DEFAULT_WATCHDOG_STALL_IDLE_SECS),
        };

        let redis_url = cli.redis_url.clone().or(file_backends.redis_url);
        let postgres_url = cli.postgres_url.clone().or(file_backends.postgres_url);
        let postgres = postgres_url.map(|url| PostgresConfig {
            url,
            max_connections: POSTGRES_DEFAULT_MAX_CONNECTIONS,
            min_connections: POSTGRES_DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
            idle_timeout_secs: POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS,
            max_lifetime_secs: POSTGRES_DEFAULT_MAX_LIFETIME_SECS,
            statement_timeout_secs: POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
        });

        let backends = BackendsConfig {
            redis_url,
            postgres,
        };

        let config = Self {
            server,
            indexing,
            consumer,
            watchdog,
            backends,
        };

        tracing::debug!(config = ?config, "Application configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_cli_empty() {
        let cli = CliConfig::default();
        let config = AppConfig::load(&cli).expect("load should succeed with no files present");
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.indexing.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.backends.redis_url.is_none());
        assert!(config.backends.postgres.is_none());
    }

    #[test]
    fn cli_overrides_defaults() {
        let mut cli = CliConfig::default();
        cli.batch_size = Some(7);
        cli.postgres_url = Some("postgres://example/db".to_string());
        let config = AppConfig::load(&cli).expect("load should succeed");
        assert_eq!(config.indexing.batch_size, 7);
        let postgres = config.backends.postgres.expect("postgres config present");
        assert_eq!(postgres.url, "postgres://example/db");
        assert_eq!(postgres.max_connections, POSTGRES_DEFAULT_MAX_CONNECTIONS);
    }
}
