//! Bitemporal relation edges.
//!
//! Edges record confirmations and contradictions between memories. They are
//! created only as a side effect of memory writes; the one permitted
//! mutation is invalidation (setting `valid_to`), which preserves history
//! instead of deleting it.

use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;

use crate::error::Result;
use crate::memory::types::{Edge, EdgeRelation};

/// Create a new active edge. Returns its id.
pub fn create_edge(
    conn: &Connection,
    from_id: &str,
    to_id: &str,
    relation: EdgeRelation,
    confidence: f64,
    metadata: Option<&serde_json::Value>,
) -> Result<String> {
    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let metadata_json = metadata.map(|m| m.to_string());

    conn.execute(
        "INSERT INTO edges (id, from_id, to_id, relation, confidence, metadata, valid_from, valid_to) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)",
        params![id, from_id, to_id, relation.as_str(), confidence, metadata_json, now],
    )?;

    Ok(id)
}

/// Invalidate an edge by setting `valid_to`. Idempotent: an already-invalid
/// edge keeps its original `valid_to`.
pub fn invalidate_edge(conn: &Connection, edge_id: &str) -> Result<bool> {
    let now = chrono::Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE edges SET valid_to = ?1 WHERE id = ?2 AND valid_to IS NULL",
        params![now, edge_id],
    )?;
    Ok(changed > 0)
}

/// All currently-active edges touching a memory, in either direction.
pub fn active_edges_for(conn: &Connection, memory_id: &str) -> Result<Vec<Edge>> {
    let mut stmt = conn.prepare(
        "SELECT id, from_id, to_id, relation, confidence, metadata, valid_from, valid_to \
         FROM edges WHERE (from_id = ?1 OR to_id = ?1) AND valid_to IS NULL \
         ORDER BY valid_from",
    )?;
    let edges = stmt
        .query_map(params![memory_id], row_to_edge)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

/// Count of active contradiction edges touching a memory. Used to keep
/// `memories.contradiction_count` consistent after invalidations.
pub fn active_contradiction_count(conn: &Connection, memory_id: &str) -> Result<u32> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM edges \
         WHERE (from_id = ?1 OR to_id = ?1) AND valid_to IS NULL AND relation LIKE 'contradicts_%'",
        params![memory_id],
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

/// Fetch one edge by id.
pub fn get_edge(conn: &Connection, edge_id: &str) -> Result<Option<Edge>> {
    let edge = conn
        .query_row(
            "SELECT id, from_id, to_id, relation, confidence, metadata, valid_from, valid_to \
             FROM edges WHERE id = ?1",
            params![edge_id],
            row_to_edge,
        )
        .optional()?;
    Ok(edge)
}

fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<Edge> {
    let relation_str: String = row.get(3)?;
    let metadata_str: Option<String> = row.get(5)?;
    Ok(Edge {
        id: row.get(0)?,
        from_id: row.get(1)?,
        to_id: row.get(2)?,
        relation: EdgeRelation::from_str(&relation_str).unwrap_or(EdgeRelation::Confirms),
        confidence: row.get(4)?,
        metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
        valid_from: row.get(6)?,
        valid_to: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::types::ContradictionKind;

    fn test_db() -> Connection {
        let conn = db::open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO memories (id, project, type, content, created_at) VALUES \
             ('m1', 'global', 'fact', 'a', '2026-01-01T00:00:00Z'), \
             ('m2', 'global', 'fact', 'b', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn create_and_fetch_edge() {
        let conn = test_db();
        let id = create_edge(
            &conn,
            "m1",
            "m2",
            EdgeRelation::Contradicts(ContradictionKind::Factual),
            0.85,
            Some(&serde_json::json!({"subject": "server"})),
        )
        .unwrap();

        let edge = get_edge(&conn, &id).unwrap().unwrap();
        assert_eq!(edge.from_id, "m1");
        assert_eq!(edge.to_id, "m2");
        assert_eq!(
            edge.relation,
            EdgeRelation::Contradicts(ContradictionKind::Factual)
        );
        assert!(edge.is_active());
        assert_eq!(edge.metadata.unwrap()["subject"], "server");
    }

    #[test]
    fn invalidation_sets_valid_to_once() {
        let conn = test_db();
        let id = create_edge(&conn, "m1", "m2", EdgeRelation::Confirms, 1.0, None).unwrap();

        assert!(invalidate_edge(&conn, &id).unwrap());
        let edge = get_edge(&conn, &id).unwrap().unwrap();
        assert!(!edge.is_active());
        let first_valid_to = edge.valid_to.clone();

        // Second invalidation is a no-op
        assert!(!invalidate_edge(&conn, &id).unwrap());
        let edge = get_edge(&conn, &id).unwrap().unwrap();
        assert_eq!(edge.valid_to, first_valid_to);
    }

    #[test]
    fn active_edges_exclude_invalidated() {
        let conn = test_db();
        let keep = create_edge(
            &conn,
            "m1",
            "m2",
            EdgeRelation::Contradicts(ContradictionKind::Negation),
            0.8,
            None,
        )
        .unwrap();
        let drop = create_edge(&conn, "m2", "m1", EdgeRelation::Confirms, 1.0, None).unwrap();
        invalidate_edge(&conn, &drop).unwrap();

        let active = active_edges_for(&conn, "m1").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, keep);
    }

    #[test]
    fn contradiction_count_tracks_active_edges() {
        let conn = test_db();
        let e1 = create_edge(
            &conn,
            "m1",
            "m2",
            EdgeRelation::Contradicts(ContradictionKind::Factual),
            0.85,
            None,
        )
        .unwrap();
        create_edge(
            &conn,
            "m2",
            "m1",
            EdgeRelation::Contradicts(ContradictionKind::Nli),
            0.7,
            None,
        )
        .unwrap();
        // Confirmations do not count
        create_edge(&conn, "m1", "m2", EdgeRelation::Confirms, 1.0, None).unwrap();

        assert_eq!(active_contradiction_count(&conn, "m1").unwrap(), 2);

        invalidate_edge(&conn, &e1).unwrap();
        assert_eq!(active_contradiction_count(&conn, "m1").unwrap(), 1);
    }

    #[test]
    fn cascade_on_memory_delete() {
        let conn = test_db();
        create_edge(&conn, "m1", "m2", EdgeRelation::Confirms, 1.0, None).unwrap();

        conn.execute("DELETE FROM memories WHERE id = 'm1'", []).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
