use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::memory::types::MemoryType;

/// Response from memory_stats.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_memories: u64,
    pub active_memories: u64,
    pub tombstoned_memories: u64,
    pub by_type: HashMap<String, u64>,
    pub by_project: HashMap<String, u64>,
    pub active_edges: u64,
    pub with_embedding: u64,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_memory: Option<String>,
}

/// Compute memory store statistics.
///
/// If `project` is provided, counts are filtered to that project plus the
/// global scope. `db_path` is used for file size; pass None for in-memory
/// databases.
pub fn memory_stats(
    conn: &Connection,
    project: Option<&str>,
    db_path: Option<&Path>,
) -> Result<StatsResponse> {
    let (total, active, tombstoned) = count_memories(conn, project)?;
    let by_type = count_by_type(conn, project)?;
    let by_project = count_by_project(conn)?;
    let active_edges = count_active_edges(conn)?;
    let with_embedding = count_with_embedding(conn, project)?;
    let (oldest, newest) = memory_time_range(conn, project)?;

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        total_memories: total,
        active_memories: active,
        tombstoned_memories: tombstoned,
        by_type,
        by_project,
        active_edges,
        with_embedding,
        db_size_bytes,
        oldest_memory: oldest,
        newest_memory: newest,
    })
}

fn scope_clause(project: Option<&str>) -> (&'static str, Option<String>) {
    match project {
        Some(p) => (
            "WHERE (project = ?1 OR project = 'global')",
            Some(p.to_string()),
        ),
        None => ("", None),
    }
}

fn count_memories(conn: &Connection, project: Option<&str>) -> Result<(u64, u64, u64)> {
    let (clause, param) = scope_clause(project);

    let total: i64 = if let Some(ref p) = param {
        conn.query_row(
            &format!("SELECT COUNT(*) FROM memories {clause}"),
            params![p],
            |row| row.get(0),
        )?
    } else {
        conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?
    };

    let active: i64 = if let Some(ref p) = param {
        conn.query_row(
            &format!("SELECT COUNT(*) FROM memories {clause} AND deleted_at IS NULL"),
            params![p],
            |row| row.get(0),
        )?
    } else {
        conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE deleted_at IS NULL",
            [],
            |row| row.get(0),
        )?
    };

    Ok((total as u64, active as u64, (total - active) as u64))
}

fn count_by_type(conn: &Connection, project: Option<&str>) -> Result<HashMap<String, u64>> {
    let (clause, param) = scope_clause(project);
    let sql = format!("SELECT type, COUNT(*) FROM memories {clause} GROUP BY type");

    let mut map = HashMap::new();
    for t in MemoryType::ALL {
        map.insert(t.as_str().to_string(), 0);
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<(String, i64)> = if let Some(ref p) = param {
        stmt.query_map(params![p], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    } else {
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };

    for (t, count) in rows {
        map.insert(t, count as u64);
    }
    Ok(map)
}

fn count_by_project(conn: &Connection) -> Result<HashMap<String, u64>> {
    let mut stmt = conn.prepare(
        "SELECT project, COUNT(*) FROM memories WHERE deleted_at IS NULL GROUP BY project",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<rusqlite::Result<HashMap<_, _>>>()?;
    Ok(rows)
}

fn count_active_edges(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM edges WHERE valid_to IS NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

fn count_with_embedding(conn: &Connection, project: Option<&str>) -> Result<u64> {
    let (clause, param) = scope_clause(project);
    let count: i64 = if let Some(ref p) = param {
        conn.query_row(
            &format!("SELECT COUNT(*) FROM memories {clause} AND embedding IS NOT NULL"),
            params![p],
            |row| row.get(0),
        )?
    } else {
        conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE embedding IS NOT NULL",
            [],
            |row| row.get(0),
        )?
    };
    Ok(count as u64)
}

fn memory_time_range(
    conn: &Connection,
    project: Option<&str>,
) -> Result<(Option<String>, Option<String>)> {
    let (clause, param) = scope_clause(project);
    let sql = format!("SELECT MIN(created_at), MAX(created_at) FROM memories {clause}");

    let range: (Option<String>, Option<String>) = if let Some(ref p) = param {
        conn.query_row(&sql, params![p], |row| Ok((row.get(0)?, row.get(1)?)))?
    } else {
        conn.query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?
    };
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn insert(conn: &Connection, id: &str, project: &str, memory_type: &str, deleted: bool) {
        let deleted_at = deleted.then(|| "2026-02-01T00:00:00Z".to_string());
        conn.execute(
            "INSERT INTO memories (id, project, type, content, created_at, deleted_at) \
             VALUES (?1, ?2, ?3, 'content', '2026-01-01T00:00:00Z', ?4)",
            params![id, project, memory_type, deleted_at],
        )
        .unwrap();
    }

    #[test]
    fn stats_count_active_and_tombstoned() {
        let conn = db::open_memory_database().unwrap();
        insert(&conn, "m1", "global", "fact", false);
        insert(&conn, "m2", "alpha", "event", false);
        insert(&conn, "m3", "alpha", "fact", true);

        let stats = memory_stats(&conn, None, None).unwrap();
        assert_eq!(stats.total_memories, 3);
        assert_eq!(stats.active_memories, 2);
        assert_eq!(stats.tombstoned_memories, 1);
        assert_eq!(stats.by_type["fact"], 2);
        assert_eq!(stats.by_type["event"], 1);
        assert_eq!(stats.by_type["decision"], 0);
        assert_eq!(stats.by_project["global"], 1);
        assert_eq!(stats.by_project["alpha"], 1);
    }

    #[test]
    fn stats_scope_filters_to_project_plus_global() {
        let conn = db::open_memory_database().unwrap();
        insert(&conn, "m1", "global", "fact", false);
        insert(&conn, "m2", "alpha", "fact", false);
        insert(&conn, "m3", "beta", "fact", false);

        let stats = memory_stats(&conn, Some("alpha"), None).unwrap();
        assert_eq!(stats.total_memories, 2);
    }

    #[test]
    fn stats_time_range() {
        let conn = db::open_memory_database().unwrap();
        insert(&conn, "m1", "global", "fact", false);

        let stats = memory_stats(&conn, None, None).unwrap();
        assert_eq!(stats.oldest_memory.as_deref(), Some("2026-01-01T00:00:00Z"));
        assert_eq!(stats.newest_memory.as_deref(), Some("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn stats_empty_db() {
        let conn = db::open_memory_database().unwrap();
        let stats = memory_stats(&conn, None, None).unwrap();
        assert_eq!(stats.total_memories, 0);
        assert!(stats.oldest_memory.is_none());
    }
}
