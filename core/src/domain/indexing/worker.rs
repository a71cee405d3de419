//! Isolated Worker contract (§4.7)
//!
//! The logic shared between the `batchline-worker` binary and its tests: for
//! each file, parse -> chunk -> embed -> upsert, continuing on any per-file
//! failure. The real parser/chunker/embedder are external collaborators; we
//! implement only the narrow call contract plus a deterministic stand-in so
//! the pipeline is testable without them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::store::{ChunkWrite, Store};

/// A chunk produced by the chunker, carrying its own metadata bag (§6).
#[derive(Debug, Clone)]
pub struct Chunk {
    pub chunk_type: String,
    pub content: String,
    pub start_line: i32,
    pub end_line: i32,
    pub metadata: Value,
}

/// The chunker/embedder collaborators the Isolated Worker calls per file
/// (§6 "Embedding & chunking collaborators"). Out of scope to implement for
/// real; `StandInCollaborators` is a deterministic fake.
pub trait Collaborators: Send + Sync {
    fn chunk(&self, content: &str, language: Option<&str>, file_path: &Path) -> Vec<Chunk>;
    fn embed(&self, texts: &[String]) -> Vec<Vec<f64>>;
}

/// Whole-file chunker and a hash-derived embedding, standing in for the
/// real AST parser/chunker/embedder this worker would otherwise call.
pub struct StandInCollaborators;

impl Collaborators for StandInCollaborators {
    fn chunk(&self, content: &str, _language: Option<&str>, _file_path: &Path) -> Vec<Chunk> {
        let line_count = content.lines().count().max(1) as i32;
        vec![Chunk {
            chunk_type: "file".to_string(),
            content: content.to_string(),
            start_line: 1,
            end_line: line_count,
            metadata: Value::Null,
        }]
    }

    fn embed(&self, texts: &[String]) -> Vec<Vec<f64>> {
        texts
            .iter()
            .map(|text| {
                let mut hash: u64 = 0xcbf29ce484222325;
                for byte in text.bytes() {
                    hash ^= u64::from(byte);
                    hash = hash.wrapping_mul(0x100000001b3);
                }
                vec![(hash % 1000) as f64 / 1000.0]
            })
            .collect()
    }
}

fn language_for(file_path: &Path) -> Option<String> {
    file_path
        .extension()
        .map(|ext| ext.to_string_lossy().to_string())
}

/// One file's outcome, used to build `per_file_errors` (§4.7).
#[derive(Debug, Clone)]
pub enum FileOutcome {
    Success,
    Error { path: PathBuf, message: String },
}

/// Stdout contract's terminal JSON object (§6, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerResult {
    pub success_count: u64,
    pub error_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_file_errors: Option<Vec<String>>,
}

/// Process `files` for `repository` against `store`, continuing past any
/// per-file failure (§4.7 "continue-on-error at file granularity").
pub async fn process_files(
    store: &Arc<dyn Store>,
    collaborators: &dyn Collaborators,
    repository: &str,
    files: &[PathBuf],
) -> WorkerResult {
    let mut success_count = 0u64;
    let mut errors: Vec<String> = Vec::new();

    for file_path in files {
        match process_one_file(store, collaborators, repository, file_path).await {
            Ok(()) => success_count += 1,
            Err(message) => {
                errors.push(format!("{}: {message}", file_path.display()));
            }
        }
    }

    WorkerResult {
        success_count,
        error_count: errors.len() as u64,
        per_file_errors: if errors.is_empty() { None } else { Some(errors) },
    }
}

async fn process_one_file(
    store: &Arc<dyn Store>,
    collaborators: &dyn Collaborators,
    repository: &str,
    file_path: &Path,
) -> Result<(), String> {
    let content = tokio::fs::read_to_string(file_path)
        .await
        .map_err(|e| format!("read failed: {e}"))?;
    let language = language_for(file_path);
    let chunks = collaborators.chunk(&content, language.as_deref(), file_path);
    if chunks.is_empty() {
        return Ok(());
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = collaborators.embed(&texts);

    for (chunk, embedding) in chunks.into_iter().zip(embeddings.into_iter()) {
        store
            .upsert_chunk(ChunkWrite {
                repository: repository.to_string(),
                file_path: file_path.to_string_lossy().to_string(),
                language: language.clone(),
                chunk_type: chunk.chunk_type,
                content: chunk.content,
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                embedding,
                metadata: chunk.metadata,
            })
            .await
            .map_err(|e| format!("upsert failed: {e}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::MemoryStore;
    use std::fs;

    #[tokio::test]
    async fn processes_all_files_and_reports_zero_errors() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a.rs");
        let b = temp.path().join("b.rs");
        fs::write(&a, "fn a() {}\n").unwrap();
        fs::write(&b, "fn b() {}\n").unwrap();

        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let result = process_files(&store, &StandInCollaborators, "acme/widgets", &[a, b]).await;

        assert_eq!(result.success_count, 2);
        assert_eq!(result.error_count, 0);
        assert!(result.per_file_errors.is_none());
        assert_eq!(store.rows_written_last_hour().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn missing_file_counts_as_error_and_does_not_stop_the_batch() {
        let temp = tempfile::tempdir().unwrap();
        let present = temp.path().join("present.rs");
        fs::write(&present, "fn x() {}\n").unwrap();
        let missing = temp.path().join("missing.rs");

        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let result =
            process_files(&store, &StandInCollaborators, "acme/widgets", &[missing, present]).await;

        assert_eq!(result.success_count, 1);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.per_file_errors.unwrap().len(), 1);
    }

    #[test]
    fn worker_result_omits_per_file_errors_when_empty() {
        let result = WorkerResult {
            success_count: 3,
            error_count: 0,
            per_file_errors: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("per_file_errors"));
    }

    #[test]
    fn stand_in_embedder_is_deterministic() {
        let collaborators = StandInCollaborators;
        let texts = vec!["hello".to_string()];
        assert_eq!(collaborators.embed(&texts), collaborators.embed(&texts));
    }
}
