//! PostgreSQL schema definitions
//!
//! Two tables: code chunks written by the batch indexing engine, and
//! conversation snippets written by the auto-save handler. Both are
//! idempotent-upsert targets keyed by their natural identity, per
//! §6 External Interfaces.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema SQL for PostgreSQL
pub const SCHEMA: &str = r#"
-- =============================================================================
-- Infrastructure: Schema version tracking
-- =============================================================================
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at BIGINT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at BIGINT NOT NULL,
    checksum TEXT NOT NULL,
    execution_time_ms INTEGER,
    success BOOLEAN NOT NULL DEFAULT TRUE
);

-- =============================================================================
-- 1. Chunks (written by the Isolated Worker, one row per code chunk)
-- =============================================================================
CREATE TABLE IF NOT EXISTS chunks (
    id SERIAL PRIMARY KEY,
    repository TEXT NOT NULL,
    file_path TEXT NOT NULL,
    language TEXT,
    chunk_type TEXT NOT NULL,
    content TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL CHECK (end_line >= start_line),
    embedding DOUBLE PRECISION[] NOT NULL,
    metadata JSONB NOT NULL DEFAULT '{}',
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL,
    UNIQUE(repository, file_path, start_line, end_line)
);

CREATE INDEX IF NOT EXISTS idx_chunks_repository ON chunks(repository);
CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(repository, file_path);

-- =============================================================================
-- 2. Conversations (written by the Auto-Save Handler, one row per message pair)
-- =============================================================================
CREATE TABLE IF NOT EXISTS conversations (
    id SERIAL PRIMARY KEY,
    session TEXT NOT NULL,
    project TEXT,
    "timestamp" BIGINT NOT NULL,
    content_hash TEXT NOT NULL,
    user_message TEXT NOT NULL,
    assistant_message TEXT NOT NULL,
    created_at BIGINT NOT NULL,
    UNIQUE(session, "timestamp", content_hash)
);

CREATE INDEX IF NOT EXISTS idx_conversations_session ON conversations(session, "timestamp");
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::assertions_on_constants)]
    fn schema_version_is_positive() {
        assert!(SCHEMA_VERSION > 0);
    }

    #[test]
    fn schema_contains_required_tables() {
        let required_tables = ["schema_version", "schema_migrations", "chunks", "conversations"];
        for table in required_tables {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "schema missing table: {table}",
            );
        }
    }

    #[test]
    fn schema_enforces_idempotency_keys() {
        assert!(SCHEMA.contains("UNIQUE(repository, file_path, start_line, end_line)"));
        assert!(SCHEMA.contains(r#"UNIQUE(session, "timestamp", content_hash)"#));
    }
}
