use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{
    ENV_APPROXIMATE_CAP, ENV_AUTOSAVE_CONCURRENCY, ENV_BATCH_SIZE, ENV_BLOCK_MS, ENV_CONFIG,
    ENV_HOST, ENV_MAX_PROCESSING_TIME_SECS, ENV_MAX_RETRY_ATTEMPTS,
    ENV_PENDING_CHECK_INTERVAL_SECS, ENV_PORT, ENV_POSTGRES_URL, ENV_REDIS_URL,
    ENV_SHUTDOWN_GRACE_SECS, ENV_WATCHDOG_INTERVAL_SECS, ENV_WATCHDOG_STALL_IDLE_SECS,
    ENV_WORKER_BIN,
};

#[derive(Parser)]
#[command(name = "batchline")]
#[command(version, about = "Batch indexing engine & auto-save queue core", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server bind host
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server bind port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Durable stream substrate connection URL. Unset selects the
    /// in-memory backend.
    #[arg(long, global = true, env = ENV_REDIS_URL)]
    pub redis_url: Option<String>,

    /// Relational store connection URL. Unset selects the in-memory backend.
    #[arg(long, global = true, env = ENV_POSTGRES_URL)]
    pub postgres_url: Option<String>,

    /// Directory Scanner / Batch Producer fixed batch size (§4.4/§4.5)
    #[arg(long, global = true, env = ENV_BATCH_SIZE)]
    pub batch_size: Option<usize>,

    /// Loose cap on stream length for memory bounding (§4.1)
    #[arg(long, global = true, env = ENV_APPROXIMATE_CAP)]
    pub approximate_cap: Option<u64>,

    /// Consumer Loop blocking read_group timeout in ms (§4.6)
    #[arg(long, global = true, env = ENV_BLOCK_MS)]
    pub block_ms: Option<u64>,

    /// Consumer Loop claim-stale pass interval in seconds (§4.6)
    #[arg(long, global = true, env = ENV_PENDING_CHECK_INTERVAL_SECS)]
    pub pending_check_interval_secs: Option<u64>,

    /// Bounded concurrency for the auto-save pipeline (§5)
    #[arg(long, global = true, env = ENV_AUTOSAVE_CONCURRENCY)]
    pub autosave_concurrency: Option<usize>,

    /// Cooperative shutdown grace period in seconds (§5)
    #[arg(long, global = true, env = ENV_SHUTDOWN_GRACE_SECS)]
    pub shutdown_grace_secs: Option<u64>,

    /// Isolated Worker binary path or name resolved on PATH (§4.7)
    #[arg(long, global = true, env = ENV_WORKER_BIN)]
    pub worker_bin: Option<String>,

    /// Worker Supervisor per-batch wall-clock timeout in seconds (§4.8)
    #[arg(long, global = true, env = ENV_MAX_PROCESSING_TIME_SECS)]
    pub max_processing_time_secs: Option<u64>,

    /// Worker Supervisor retry budget before permanent batch failure (§4.8)
    #[arg(long, global = true, env = ENV_MAX_RETRY_ATTEMPTS)]
    pub max_retry_attempts: Option<u32>,

    /// Completion Trigger watchdog sweep interval in seconds (§4.10)
    #[arg(long, global = true, env = ENV_WATCHDOG_INTERVAL_SECS)]
    pub watchdog_interval_secs: Option<u64>,

    /// Watchdog stall-detection idle period in seconds (§4.10)
    #[arg(long, global = true, env = ENV_WATCHDOG_STALL_IDLE_SECS)]
    pub watchdog_stall_idle_secs: Option<u64>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Start,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub postgres_url: Option<String>,
    pub batch_size: Option<usize>,
    pub approximate_cap: Option<u64>,
    pub block_ms: Option<u64>,
    pub pending_check_interval_secs: Option<u64>,
    pub autosave_concurrency: Option<usize>,
    pub shutdown_grace_secs: Option<u64>,
    pub worker_bin: Option<String>,
    pub max_processing_time_secs: Option<u64>,
    pub max_retry_attempts: Option<u32>,
    pub watchdog_interval_secs: Option<u64>,
    pub watchdog_stall_idle_secs: Option<u64>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        config: cli.config,
        redis_url: cli.redis_url,
        postgres_url: cli.postgres_url,
        batch_size: cli.batch_size,
        approximate_cap: cli.approximate_cap,
        block_ms: cli.block_ms,
        pending_check_interval_secs: cli.pending_check_interval_secs,
        autosave_concurrency: cli.autosave_concurrency,
        shutdown_grace_secs: cli.shutdown_grace_secs,
        worker_bin: cli.worker_bin,
        max_processing_time_secs: cli.max_processing_time_secs,
        max_retry_attempts: cli.max_retry_attempts,
        watchdog_interval_secs: cli.watchdog_interval_secs,
        watchdog_stall_idle_secs: cli.watchdog_stall_idle_secs,
    };
    (config, cli.command)
}
