//! Isolated Worker (§4.7)
//!
//! Spawned fresh per batch by the Worker Supervisor. Parses the narrow
//! `--repository`/`--db-url`/`--files` contract, runs each file through the
//! chunk/embed/upsert pipeline continuing past per-file failures, and
//! writes the terminal `{success_count, error_count, per_file_errors?}`
//! JSON object as the last line of stdout (§6).

use std::path::PathBuf;
use std::sync::Arc;

use batchline_core::data::store::{MemoryStore, PostgresStore, Store};
use batchline_core::domain::indexing::{StandInCollaborators, process_files};
use clap::Parser;

#[derive(Parser)]
#[command(name = "batchline-worker")]
struct Args {
    /// Repository label this batch belongs to.
    #[arg(long)]
    repository: String,

    /// Relational store connection string. Empty selects the in-memory
    /// store, used in tests and single-process development.
    #[arg(long = "db-url")]
    db_url: String,

    /// Comma-separated file paths making up this batch.
    #[arg(long)]
    files: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let files: Vec<PathBuf> = args
        .files
        .split(',')
        .filter(|f| !f.is_empty())
        .map(PathBuf::from)
        .collect();

    let store: Arc<dyn Store> = if args.db_url.is_empty() {
        Arc::new(MemoryStore::new())
    } else {
        match sqlx::PgPool::connect(&args.db_url).await {
            Ok(pool) => Arc::new(PostgresStore::new(pool)),
            Err(e) => {
                eprintln!("database connection error: {e}");
                std::process::exit(1);
            }
        }
    };

    let result = process_files(&store, &StandInCollaborators, &args.repository, &files).await;
    match serde_json::to_string(&result) {
        Ok(line) => println!("{line}"),
        Err(e) => {
            eprintln!("critical error: failed to serialize worker result: {e}");
            std::process::exit(1);
        }
    }
}
