//! Batch indexing engine: directory scan, batch production, consumer loop,
//! worker supervision, and completion detection (§4.4-§4.8, §4.10).

pub mod consumer;
pub mod errors;
pub mod messages;
pub mod producer;
pub mod scanner;
pub mod status;
pub mod supervisor;
pub mod watchdog;
pub mod worker;

pub use consumer::ConsumerLoop;
pub use errors::{BatchError, classify_stderr};
pub use messages::BatchMessage;
pub use producer::{BatchProducer, ProducedJob};
pub use scanner::{DirectoryScanner, FileClassification, ScannedFile};
pub use status::{JobState, JobStatus, StatusRecordStore};
pub use supervisor::{Disposition, WorkerSupervisor};
pub use watchdog::Watchdog;
pub use worker::{Collaborators, StandInCollaborators, WorkerResult, process_files};
