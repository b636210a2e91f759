//! Retention-driven archival.
//!
//! Sweeps the corpus for memories that are unimportant, decayed, weak, and
//! long inactive, and tombstones them. A minimum corpus size is always
//! preserved regardless of thresholds, and a dry run reports candidates
//! without touching anything.

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::config::RetentionConfig;
use crate::error::Result;
use crate::memory::retention;
use crate::memory::{days_between, now_rfc3339, write_audit_log};

#[derive(Debug, Serialize)]
pub struct ArchiveResult {
    pub candidates: Vec<ArchiveCandidate>,
    pub archived: usize,
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct ArchiveCandidate {
    pub id: String,
    pub content_preview: String,
    pub importance: f64,
    pub retention: f64,
    pub days_inactive: i64,
}

struct SweepRow {
    id: String,
    content: String,
    importance: f64,
    strength: f64,
    created_at: String,
    last_accessed: Option<String>,
}

/// Find archive candidates and (unless `dry_run`) tombstone them.
pub fn archive_sweep(
    conn: &Connection,
    cfg: &RetentionConfig,
    dry_run: bool,
) -> Result<ArchiveResult> {
    let active: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE deleted_at IS NULL",
        [],
        |row| row.get(0),
    )?;

    // The floor applies to the whole sweep: never shrink below min corpus
    let budget = (active as usize).saturating_sub(cfg.archive_min_corpus);
    if budget == 0 {
        return Ok(ArchiveResult {
            candidates: Vec::new(),
            archived: 0,
            dry_run,
        });
    }

    let mut stmt = conn.prepare(
        "SELECT id, content, importance, strength, created_at, last_accessed \
         FROM memories WHERE deleted_at IS NULL \
         ORDER BY COALESCE(last_accessed, created_at) ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SweepRow {
                id: row.get(0)?,
                content: row.get(1)?,
                importance: row.get(2)?,
                strength: row.get(3)?,
                created_at: row.get(4)?,
                last_accessed: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let now = now_rfc3339();
    let mut candidates = Vec::new();
    for row in rows {
        if candidates.len() >= budget {
            break;
        }
        let reference = row.last_accessed.as_deref().unwrap_or(&row.created_at);
        let days_inactive = days_between(reference, &now) as i64;
        let current_retention =
            retention::retention(days_inactive as f64 * 24.0, row.strength, row.importance, cfg);

        if retention::is_archive_candidate(
            row.importance,
            current_retention,
            row.strength,
            days_inactive,
            cfg,
        ) {
            candidates.push(ArchiveCandidate {
                id: row.id,
                content_preview: preview(&row.content, 80),
                importance: row.importance,
                retention: current_retention,
                days_inactive,
            });
        }
    }

    let mut archived = 0;
    if !dry_run {
        for candidate in &candidates {
            conn.execute(
                "UPDATE memories SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                params![now, candidate.id],
            )?;
            write_audit_log(
                conn,
                "archive",
                &candidate.id,
                Some(&serde_json::json!({
                    "retention": candidate.retention,
                    "days_inactive": candidate.days_inactive,
                })),
            )?;
            archived += 1;
        }
        if archived > 0 {
            tracing::info!(archived, "archive sweep tombstoned memories");
        }
    }

    Ok(ArchiveResult {
        candidates,
        archived,
        dry_run,
    })
}

fn preview(content: &str, max_chars: usize) -> String {
    if content.len() <= max_chars {
        content.to_string()
    } else {
        let end = content
            .char_indices()
            .take_while(|(i, _)| *i < max_chars)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(max_chars);
        format!("{}...", &content[..end])
    }
}
