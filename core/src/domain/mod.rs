//! Domain logic for the batch indexing engine and auto-save queue
//!
//! - `indexing` — directory scan, batch production, consumer loop, worker
//!   supervision, completion detection (§4.4–§4.8, §4.10)
//! - `autosave` — the auto-save handler (§4.9)
//! - `metrics` — the periodic metrics snapshot (§4.11)

pub mod autosave;
pub mod indexing;
pub mod metrics;
