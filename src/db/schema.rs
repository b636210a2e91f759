//! SQL DDL for all Engram tables.
//!
//! Defines the `memories`, `memories_fts` (FTS5), `vectors` + `vectors_ann`
//! (vec0), `edges`, `memory_log`, and `schema_meta` tables. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// All schema DDL statements for Engram's core tables.
const SCHEMA_SQL: &str = r#"
-- Core memory storage
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    project TEXT NOT NULL DEFAULT 'global',
    type TEXT NOT NULL CHECK(type IN ('fact','event','observation','preference','note','decision')),
    content TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    importance REAL NOT NULL DEFAULT 0.5 CHECK(importance >= 0.0 AND importance <= 1.0),
    confidence REAL NOT NULL DEFAULT 0.7 CHECK(confidence >= 0.0 AND confidence <= 1.0),
    strength REAL NOT NULL DEFAULT 1.0 CHECK(strength >= 0.0),
    source_count INTEGER NOT NULL DEFAULT 1 CHECK(source_count >= 1),
    contradiction_count INTEGER NOT NULL DEFAULT 0 CHECK(contradiction_count >= 0),
    access_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    last_accessed TEXT,
    deleted_at TEXT,
    embedding BLOB
);

CREATE INDEX IF NOT EXISTS idx_memories_project ON memories(project);
CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(type);
CREATE INDEX IF NOT EXISTS idx_memories_deleted ON memories(deleted_at);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);

-- Full-text search (BM25)
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    content,
    id UNINDEXED,
    content='memories',
    content_rowid='rowid'
);

-- Embedded vector backend: payload rows for exact scoring and full scans
CREATE TABLE IF NOT EXISTS vectors (
    id TEXT PRIMARY KEY,
    project TEXT NOT NULL DEFAULT 'global',
    deleted INTEGER NOT NULL DEFAULT 0,
    embedding BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_vectors_project ON vectors(project);

-- Bitemporal relation edges (contradiction / confirmation)
CREATE TABLE IF NOT EXISTS edges (
    id TEXT PRIMARY KEY,
    from_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    to_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    relation TEXT NOT NULL CHECK(relation IN (
        'confirms',
        'contradicts_negation','contradicts_antonym','contradicts_factual',
        'contradicts_semantic','contradicts_nli','contradicts_manual')),
    confidence REAL NOT NULL DEFAULT 1.0,
    metadata TEXT,
    valid_from TEXT NOT NULL,
    valid_to TEXT
);

CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_id);
CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_id);
CREATE INDEX IF NOT EXISTS idx_edges_relation ON edges(relation);

-- Audit log
CREATE TABLE IF NOT EXISTS memory_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL CHECK(operation IN ('create','update','access','confirm','contradict','delete','archive')),
    memory_id TEXT NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// vec0 virtual table must be created separately (sqlite-vec syntax).
/// Serves as the ANN index for the embedded vector backend.
const VEC_TABLE_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS vectors_ann USING vec0(
    id TEXT PRIMARY KEY,
    embedding FLOAT[384]
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(VEC_TABLE_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
