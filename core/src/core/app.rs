//! Application wiring: configuration, backend selection, background task
//! orchestration, and the HTTP server (§2 System overview, §5 Concurrency &
//! resource model).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::api::ApiServer;
use crate::data::postgres::PostgresService;
use crate::data::status::{MemoryStatusBackend, RedisStatusBackend, StatusBackend};
use crate::data::store::{MemoryStore, PostgresStore, Store};
use crate::data::stream::{MemoryStreamBackend, RedisStreamBackend, StreamBackend};
use crate::domain::autosave::AutoSaveHandler;
use crate::domain::indexing::status::StatusRecordStore;
use crate::domain::indexing::{BatchProducer, ConsumerLoop, Watchdog, WorkerSupervisor};
use crate::domain::metrics::{LastSaveTracker, MetricsAggregator};

use super::banner::print_banner;
use super::cli;
use super::config::AppConfig;
use super::constants::ENV_LOG;
use super::shutdown::ShutdownService;

/// Shared application state handed to the HTTP layer, grouping everything a
/// route handler needs without exposing the background task machinery.
#[derive(Clone)]
pub struct AppState {
    pub stream: Arc<dyn StreamBackend>,
    pub status: Arc<StatusRecordStore>,
    pub store: Arc<dyn Store>,
    pub producer: Arc<BatchProducer>,
    pub metrics: Arc<MetricsAggregator>,
}

pub struct CoreApp;

impl CoreApp {
    /// Entry point invoked by `main.rs`: parse CLI, load configuration, wire
    /// every adapter and domain component, and run until shutdown.
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        init_tracing();

        let (cli_config, _command) = cli::parse();
        let config = AppConfig::load(&cli_config).context("failed to load configuration")?;

        let stream = build_stream_backend(&config).await?;
        let status_backend = build_status_backend(&config).await?;
        let store = build_store(&config).await?;

        let status = Arc::new(StatusRecordStore::new(status_backend));
        let last_save = Arc::new(LastSaveTracker::new());

        let producer = Arc::new(
            BatchProducer::new(stream.clone(), status.clone())
                .with_batch_size(config.indexing.batch_size)
                .with_approximate_cap(config.indexing.approximate_cap),
        );

        let postgres_url = config
            .backends
            .postgres
            .as_ref()
            .map(|p| p.url.clone())
            .unwrap_or_default();

        let supervisor = WorkerSupervisor::new(status.clone(), postgres_url)
            .with_worker_bin(config.indexing.worker_bin.clone())
            .with_timeout(Duration::from_secs(config.indexing.max_processing_time_secs))
            .with_max_retry_attempts(config.indexing.max_retry_attempts);

        let autosave = AutoSaveHandler::new(store.clone()).with_last_save_tracker(last_save.clone());

        let consumer = Arc::new(
            ConsumerLoop::new(stream.clone(), status.clone(), supervisor, autosave)
                .with_block_ms(config.consumer.block_ms)
                .with_pending_check_interval(Duration::from_secs(
                    config.consumer.pending_check_interval_secs,
                ))
                .with_autosave_concurrency(config.consumer.autosave_concurrency)
                .with_min_idle_ms(config.indexing.max_processing_time_secs * 2 * 1000),
        );

        let watchdog = Arc::new(
            Watchdog::new(status.clone())
                .with_interval(Duration::from_secs(config.watchdog.interval_secs))
                .with_stall_idle(Duration::from_secs(config.watchdog.stall_idle_secs)),
        );

        let metrics = Arc::new(MetricsAggregator::new(
            stream.clone(),
            store.clone(),
            status.clone(),
            last_save,
        ));

        let shutdown = ShutdownService::new(Duration::from_secs(config.consumer.shutdown_grace_secs));
        shutdown.install_signal_handlers();

        let consumer_task = {
            let consumer = consumer.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { consumer.run(shutdown).await })
        };
        shutdown.register(consumer_task).await;

        let watchdog_task = {
            let watchdog = watchdog.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { watchdog.run(shutdown).await })
        };
        shutdown.register(watchdog_task).await;

        let state = AppState {
            stream: stream.clone(),
            status: status.clone(),
            store: store.clone(),
            producer,
            metrics,
        };

        print_banner(&config.server.host, config.server.port, stream.backend_name(), store.backend_name());

        let server = ApiServer::new(state);
        server.serve(&config.server.host, config.server.port, shutdown.clone()).await?;

        shutdown.shutdown().await;
        Ok(())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// `None` redis URL selects the in-memory stream backend (§4.1, development
/// and tests); `Some` selects the durable Redis Streams backend.
async fn build_stream_backend(config: &AppConfig) -> Result<Arc<dyn StreamBackend>> {
    match &config.backends.redis_url {
        Some(url) => {
            let backend = RedisStreamBackend::new(url)
                .await
                .context("failed to connect to the durable stream substrate")?;
            Ok(Arc::new(backend))
        }
        None => Ok(Arc::new(MemoryStreamBackend::new())),
    }
}

async fn build_status_backend(config: &AppConfig) -> Result<Arc<dyn StatusBackend>> {
    match &config.backends.redis_url {
        Some(url) => {
            let backend = RedisStatusBackend::new(url)
                .await
                .context("failed to connect to the status record backend")?;
            Ok(Arc::new(backend))
        }
        None => Ok(Arc::new(MemoryStatusBackend::new())),
    }
}

async fn build_store(config: &AppConfig) -> Result<Arc<dyn Store>> {
    match &config.backends.postgres {
        Some(postgres_config) => {
            let service = PostgresService::init(postgres_config)
                .await
                .context("failed to connect to the relational store")?;
            Ok(Arc::new(PostgresStore::new(service.pool().clone())))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}
