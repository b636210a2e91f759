//! Hybrid retrieval: FTS5 BM25 + vector similarity fused with weighted RRF.
//!
//! The two sub-queries run concurrently; a failure or timeout in either one
//! degrades to single-method results instead of failing the search. Fused
//! scores are normalized by the max in the result set, filtered by a minimum
//! score, and annotated with the decay-adjusted confidence and retention
//! models.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::config::{RetentionConfig, RetrievalConfig};
use crate::error::{EngramError, Result};
use crate::memory::confidence::{self, ConfidenceLevel};
use crate::memory::retention::{self, RetentionLevel};
use crate::memory::types::GLOBAL_PROJECT;
use crate::memory::{days_between, now_rfc3339, write_audit_log};
use crate::vector::{ScoredPoint, VectorFilter, VectorStore};

/// A single annotated search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    #[serde(rename = "type")]
    pub memory_type: String,
    pub content: String,
    /// Fused RRF score normalized to `[0, 1]` within the result set.
    pub score: f64,
    pub effective_confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub retention: f64,
    pub retention_level: RetentionLevel,
    /// Highlighted match window from the lexical engine, when it matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caution: Option<&'static str>,
}

/// Hybrid search entry point.
pub async fn hybrid_search(
    conn: Arc<Mutex<Connection>>,
    vectors: Arc<dyn VectorStore>,
    query_text: &str,
    query_embedding: Option<Vec<f32>>,
    project: &str,
    limit: usize,
    min_confidence: f64,
    cfg: &RetrievalConfig,
    retention_cfg: &RetentionConfig,
) -> Result<Vec<SearchHit>> {
    let candidate_limit = limit.max(1) * 3;

    // Lexical sub-query on the blocking pool, vector sub-query on the store;
    // join both, degrade to single-method on failure.
    let fts_conn = Arc::clone(&conn);
    let fts_query = query_text.to_string();
    let lexical_task = tokio::task::spawn_blocking(move || {
        let guard = fts_conn.lock().expect("connection lock poisoned");
        fts_search(&guard, &fts_query, candidate_limit)
    });

    let vector_future = async {
        match query_embedding {
            Some(ref embedding) if vectors.is_ready() => {
                let filter = VectorFilter {
                    project: Some(project.to_string()),
                    exclude_deleted: true,
                    ..Default::default()
                };
                vectors.search(embedding, candidate_limit, &filter).await
            }
            _ => Ok(Vec::new()),
        }
    };

    let (lexical_joined, vector_result) = tokio::join!(lexical_task, vector_future);

    let lexical = match lexical_joined {
        Ok(Ok(results)) => results,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "lexical sub-query failed, degrading to vector-only");
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "lexical task panicked, degrading to vector-only");
            Vec::new()
        }
    };
    let semantic = match vector_result {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!(error = %e, "vector sub-query failed, degrading to lexical-only");
            Vec::new()
        }
    };

    let snippets: HashMap<String, String> = lexical
        .iter()
        .map(|hit| (hit.id.clone(), hit.snippet.clone()))
        .collect();

    let fused = weighted_rrf(&lexical, &semantic, cfg);
    if fused.is_empty() {
        return Ok(Vec::new());
    }

    let guard = conn.lock().expect("connection lock poisoned");
    let hits = build_hits(
        &guard,
        &fused,
        &snippets,
        project,
        limit,
        min_confidence,
        cfg,
        retention_cfg,
    )?;

    // Recall bookkeeping applies only to what the caller actually receives
    let returned: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    apply_access_boost(&guard, &returned, retention_cfg)?;

    Ok(hits)
}

/// One lexical match: FTS5 rank plus a highlighted snippet window.
#[derive(Debug, Clone)]
pub(crate) struct LexicalHit {
    pub id: String,
    pub snippet: String,
}

/// FTS5 BM25 keyword search, best rank first.
pub(crate) fn fts_search(
    conn: &Connection,
    query_text: &str,
    limit: usize,
) -> Result<Vec<LexicalHit>> {
    let escaped = escape_fts_query(query_text);
    if escaped.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT id, snippet(memories_fts, 0, '[', ']', '…', 12) FROM memories_fts \
         WHERE memories_fts MATCH ?1 ORDER BY rank LIMIT ?2",
    )?;
    let results = stmt
        .query_map(params![escaped, limit as i64], |row| {
            Ok(LexicalHit {
                id: row.get(0)?,
                snippet: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(results)
}

/// Escape a user query for FTS5 MATCH syntax.
///
/// Wraps each whitespace-delimited word in double quotes and joins with spaces
/// so FTS5 treats them as individual terms (implicit AND). Strips empty tokens.
fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| {
            let clean = word.replace('"', "");
            format!("\"{clean}\"")
        })
        .filter(|w| w != "\"\"")
        .collect::<Vec<_>>()
        .join(" ")
}

/// Weighted Reciprocal Rank Fusion.
///
/// `score(id) = Σ_method weight_method / (k + rank_method)`. Candidates
/// absent from one method simply omit that term. Output is normalized by the
/// maximum score and sorted descending (ties broken by id for determinism).
fn weighted_rrf(
    lexical: &[LexicalHit],
    semantic: &[ScoredPoint],
    cfg: &RetrievalConfig,
) -> Vec<(String, f64)> {
    let k = cfg.rrf_k as f64;
    let mut scores: HashMap<String, f64> = HashMap::new();

    for (rank, hit) in lexical.iter().enumerate() {
        *scores.entry(hit.id.clone()).or_insert(0.0) +=
            cfg.lexical_weight / (k + rank as f64);
    }
    for (rank, point) in semantic.iter().enumerate() {
        *scores.entry(point.id.clone()).or_insert(0.0) +=
            cfg.semantic_weight / (k + rank as f64);
    }

    let max = scores.values().cloned().fold(0.0f64, f64::max);
    if max <= 0.0 {
        return Vec::new();
    }

    let mut fused: Vec<(String, f64)> = scores
        .into_iter()
        .map(|(id, score)| (id, score / max))
        .collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}

struct HitRow {
    id: String,
    memory_type: String,
    content: String,
    project: String,
    importance: f64,
    confidence: f64,
    strength: f64,
    source_count: u32,
    contradiction_count: u32,
    created_at: String,
    last_accessed: Option<String>,
    deleted: bool,
}

/// Hydrate fused candidates, enforce visibility and confidence filters, and
/// annotate with the decay models.
#[allow(clippy::too_many_arguments)]
fn build_hits(
    conn: &Connection,
    fused: &[(String, f64)],
    snippets: &HashMap<String, String>,
    project: &str,
    limit: usize,
    min_confidence: f64,
    cfg: &RetrievalConfig,
    retention_cfg: &RetentionConfig,
) -> Result<Vec<SearchHit>> {
    let ids: Vec<&str> = fused.iter().map(|(id, _)| id.as_str()).collect();
    let rows = fetch_rows(conn, &ids)?;
    let now = now_rfc3339();

    let mut hits = Vec::new();
    for (id, score) in fused {
        if *score < cfg.min_score {
            continue;
        }
        let Some(row) = rows.get(id.as_str()) else {
            continue;
        };
        if row.deleted {
            continue;
        }
        if row.project != GLOBAL_PROJECT && row.project != project {
            continue;
        }

        let reference = row.last_accessed.as_deref().unwrap_or(&row.created_at);
        let days_idle = days_between(reference, &now);
        let effective = confidence::effective_confidence(
            row.confidence,
            days_idle,
            row.source_count,
            row.contradiction_count,
            row.importance,
        );
        if effective < min_confidence {
            continue;
        }

        let ret = retention::retention(days_idle * 24.0, row.strength, row.importance, retention_cfg);
        let level = confidence::confidence_level(effective);
        hits.push(SearchHit {
            id: row.id.clone(),
            memory_type: row.memory_type.clone(),
            content: row.content.clone(),
            score: *score,
            effective_confidence: effective,
            confidence_level: level,
            retention: ret,
            retention_level: retention::retention_level(ret),
            snippet: Some(
                snippets
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| truncate_snippet(&row.content, cfg.snippet_chars)),
            ),
            caution: level.caution(),
        });
        if hits.len() >= limit {
            break;
        }
    }
    Ok(hits)
}

/// Batch-fetch rows by id.
fn fetch_rows(conn: &Connection, ids: &[&str]) -> Result<HashMap<String, HitRow>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT id, type, content, project, importance, confidence, strength, \
         source_count, contradiction_count, created_at, last_accessed, deleted_at \
         FROM memories WHERE id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_vec: Vec<&dyn rusqlite::types::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

    let rows = stmt
        .query_map(params_vec.as_slice(), |row| {
            let deleted_at: Option<String> = row.get(11)?;
            Ok(HitRow {
                id: row.get(0)?,
                memory_type: row.get(1)?,
                content: row.get(2)?,
                project: row.get(3)?,
                importance: row.get(4)?,
                confidence: row.get(5)?,
                strength: row.get(6)?,
                source_count: row.get(7)?,
                contradiction_count: row.get(8)?,
                created_at: row.get(9)?,
                last_accessed: row.get(10)?,
                deleted: deleted_at.is_some(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut map = HashMap::new();
    for row in rows {
        map.insert(row.id.clone(), row);
    }
    Ok(map)
}

/// Recall bookkeeping: strength boost, access count, last-accessed stamp,
/// and an audit entry per returned memory.
pub(crate) fn apply_access_boost(
    conn: &Connection,
    ids: &[&str],
    cfg: &RetentionConfig,
) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let now = now_rfc3339();
    for id in ids {
        let row: Option<(f64, f64, u32)> = conn
            .query_row(
                "SELECT strength, importance, access_count FROM memories WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(EngramError::Db(other)),
            })?;
        let Some((strength, importance, access_count)) = row else {
            continue;
        };

        let boost = retention::access_boost(access_count, importance, cfg);
        let new_strength = retention::apply_boost(strength, boost, cfg);
        conn.execute(
            "UPDATE memories SET strength = ?1, access_count = access_count + 1, \
             last_accessed = ?2 WHERE id = ?3",
            params![new_strength, now, id],
        )?;
        write_audit_log(
            conn,
            "access",
            id,
            Some(&serde_json::json!({"boost": boost})),
        )?;
    }
    Ok(())
}

/// Truncate content to max_chars, appending "..." if truncated.
fn truncate_snippet(content: &str, max_chars: usize) -> String {
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
