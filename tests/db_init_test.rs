use engram::db;

#[test]
fn open_database_creates_file_and_schema() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested/dir/memory.db");

    let conn = db::open_database(&db_path).unwrap();
    assert!(db_path.exists(), "parent directories are created");

    // WAL mode is on for concurrent readers
    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(journal_mode.to_lowercase(), "wal");

    let foreign_keys: i64 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap();
    assert_eq!(foreign_keys, 1);

    // Schema and migrations are applied
    let version = db::migrations::get_schema_version(&conn).unwrap();
    assert_eq!(version, db::migrations::CURRENT_SCHEMA_VERSION);
}

#[test]
fn reopening_existing_database_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("memory.db");

    {
        let conn = db::open_database(&db_path).unwrap();
        conn.execute(
            "INSERT INTO memories (id, project, type, content, created_at) \
             VALUES ('m1', 'global', 'fact', 'persisted', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
    }

    let conn = db::open_database(&db_path).unwrap();
    let content: String = conn
        .query_row("SELECT content FROM memories WHERE id = 'm1'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(content, "persisted");
}

#[test]
fn vec_extension_is_loaded() {
    let conn = db::open_memory_database().unwrap();
    let version: String = conn
        .query_row("SELECT vec_version()", [], |row| row.get(0))
        .unwrap();
    assert!(!version.is_empty());
}
