//! Embedded vector backend: vectors co-located with the relational store.
//!
//! Rows live in the `vectors` table (payload + raw f32 blob) with a vec0
//! virtual table (`vectors_ann`) as the approximate index. Search fetches
//! `limit × 3` ANN candidates and re-scores them with exact cosine; when the
//! index is unavailable or returns nothing, it falls back to a full scan of
//! every non-deleted, scope-matching row.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};

use super::{
    finalize_results, PointMetadata, ScoredPoint, UpsertItem, VectorFilter, VectorStore,
    ANN_CANDIDATE_MULTIPLIER,
};
use crate::embedding::{cosine_similarity, EMBEDDING_DIM};
use crate::error::{EngramError, Result};
use crate::memory::types::GLOBAL_PROJECT;

pub struct EmbeddedVectorStore {
    conn: Arc<Mutex<Connection>>,
    ann_ready: AtomicBool,
    /// Dimension values already reported, to log each mismatch once.
    logged_mismatches: Mutex<HashSet<usize>>,
}

impl EmbeddedVectorStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        let ann_ready = {
            let guard = conn.lock().expect("connection lock poisoned");
            guard
                .query_row("SELECT COUNT(*) FROM vectors_ann LIMIT 1", [], |_| Ok(()))
                .is_ok()
        };
        if !ann_ready {
            tracing::warn!("vec0 ANN index unavailable, embedded search will full-scan");
        }
        Self {
            conn,
            ann_ready: AtomicBool::new(ann_ready),
            logged_mismatches: Mutex::new(HashSet::new()),
        }
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() == EMBEDDING_DIM {
            return Ok(());
        }
        let mut logged = self.logged_mismatches.lock().expect("mismatch lock poisoned");
        if logged.insert(embedding.len()) {
            tracing::error!(
                expected = EMBEDDING_DIM,
                got = embedding.len(),
                "rejecting embedding with wrong dimension"
            );
        }
        Err(EngramError::InvalidEmbeddingDimension {
            expected: EMBEDDING_DIM,
            got: embedding.len(),
        })
    }

    fn upsert_sync(
        &self,
        conn: &Connection,
        id: &str,
        embedding: &[f32],
        metadata: &PointMetadata,
    ) -> Result<()> {
        self.check_dimension(embedding)?;
        let bytes = embedding_to_bytes(embedding);

        conn.execute(
            "INSERT INTO vectors (id, project, deleted, embedding) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(id) DO UPDATE SET project = ?2, deleted = ?3, embedding = ?4",
            params![id, metadata.project, metadata.deleted as i64, bytes],
        )?;

        if self.ann_ready.load(Ordering::Relaxed) {
            // vec0 has no upsert; replace the row
            let result: rusqlite::Result<()> = (|| {
                conn.execute("DELETE FROM vectors_ann WHERE id = ?1", params![id])?;
                conn.execute(
                    "INSERT INTO vectors_ann (id, embedding) VALUES (?1, ?2)",
                    params![id, bytes],
                )?;
                Ok(())
            })();
            if let Err(e) = result {
                tracing::warn!(error = %e, "ANN index write failed, degrading to full scan");
                self.ann_ready.store(false, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// ANN candidates re-scored exactly. Empty result means "fall back".
    fn ann_candidates(
        &self,
        conn: &Connection,
        query: &[f32],
        limit: usize,
    ) -> Vec<String> {
        let bytes = embedding_to_bytes(query);
        let fetch = limit * ANN_CANDIDATE_MULTIPLIER;
        let result: rusqlite::Result<Vec<String>> = (|| {
            let mut stmt = conn.prepare(
                "SELECT id FROM vectors_ann WHERE embedding MATCH ?1 \
                 ORDER BY distance LIMIT ?2",
            )?;
            let ids = stmt
                .query_map(params![bytes, fetch as i64], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })();
        match result {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "ANN query failed, degrading to full scan");
                self.ann_ready.store(false, Ordering::Relaxed);
                Vec::new()
            }
        }
    }

    fn score_candidates(
        &self,
        conn: &Connection,
        query: &[f32],
        ids: &[String],
        filter: &VectorFilter,
    ) -> Result<Vec<ScoredPoint>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT id, project, deleted, embedding FROM vectors WHERE id IN ({})",
            placeholders.join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let params_vec: Vec<&dyn rusqlite::types::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

        let rows = stmt
            .query_map(params_vec.as_slice(), row_to_candidate)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(self.score_rows(query, rows, filter))
    }

    fn full_scan(
        &self,
        conn: &Connection,
        query: &[f32],
        filter: &VectorFilter,
    ) -> Result<Vec<ScoredPoint>> {
        let mut stmt =
            conn.prepare("SELECT id, project, deleted, embedding FROM vectors")?;
        let rows = stmt
            .query_map([], row_to_candidate)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(self.score_rows(query, rows, filter))
    }

    fn score_rows(
        &self,
        query: &[f32],
        rows: Vec<CandidateRow>,
        filter: &VectorFilter,
    ) -> Vec<ScoredPoint> {
        rows.into_iter()
            .filter(|row| row_passes(row, filter))
            .filter_map(|row| {
                let embedding = bytes_to_embedding(&row.embedding);
                if embedding.len() != EMBEDDING_DIM {
                    // Corrupt or legacy blob: ignore rather than skew scores
                    return None;
                }
                let score = cosine_similarity(query, &embedding).max(0.0);
                Some(ScoredPoint { id: row.id, score })
            })
            .collect()
    }
}

struct CandidateRow {
    id: String,
    project: String,
    deleted: bool,
    embedding: Vec<u8>,
}

fn row_to_candidate(row: &rusqlite::Row<'_>) -> rusqlite::Result<CandidateRow> {
    Ok(CandidateRow {
        id: row.get(0)?,
        project: row.get(1)?,
        deleted: row.get::<_, i64>(2)? != 0,
        embedding: row.get(3)?,
    })
}

fn row_passes(row: &CandidateRow, filter: &VectorFilter) -> bool {
    if filter.exclude_deleted && row.deleted {
        return false;
    }
    if filter.exclude_ids.iter().any(|id| id == &row.id) {
        return false;
    }
    if let Some(ref project) = filter.project {
        if row.project != *project && row.project != GLOBAL_PROJECT {
            return false;
        }
    }
    true
}

#[async_trait]
impl VectorStore for EmbeddedVectorStore {
    fn is_ready(&self) -> bool {
        // The store is usable even without the ANN index (full-scan path)
        self.conn
            .lock()
            .map(|conn| conn.query_row("SELECT 1", [], |_| Ok(())).is_ok())
            .unwrap_or(false)
    }

    async fn upsert(&self, id: &str, embedding: &[f32], metadata: &PointMetadata) -> Result<()> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        self.upsert_sync(&conn, id, embedding, metadata)
    }

    async fn upsert_batch(&self, items: &[UpsertItem]) -> Result<usize> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        let mut written = 0;
        for item in items {
            self.upsert_sync(&conn, &item.id, &item.embedding, &item.metadata)?;
            written += 1;
        }
        Ok(written)
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<ScoredPoint>> {
        if query.len() != EMBEDDING_DIM {
            return Err(EngramError::InvalidEmbeddingDimension {
                expected: EMBEDDING_DIM,
                got: query.len(),
            });
        }
        let conn = self.conn.lock().expect("connection lock poisoned");

        let scored = if self.ann_ready.load(Ordering::Relaxed) {
            let candidates = self.ann_candidates(&conn, query, limit);
            if candidates.is_empty() {
                self.full_scan(&conn, query, filter)?
            } else {
                self.score_candidates(&conn, query, &candidates, filter)?
            }
        } else {
            self.full_scan(&conn, query, filter)?
        };

        Ok(finalize_results(scored, limit, filter.min_score))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        conn.execute("DELETE FROM vectors WHERE id = ?1", params![id])?;
        if self.ann_ready.load(Ordering::Relaxed) {
            if let Err(e) = conn.execute("DELETE FROM vectors_ann WHERE id = ?1", params![id]) {
                tracing::warn!(error = %e, "ANN index delete failed");
                self.ann_ready.store(false, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM vectors WHERE deleted = 0", [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    async fn close(&self) -> Result<()> {
        // The connection is owned by the memory store; nothing to release.
        Ok(())
    }
}

/// Convert an f32 embedding slice to raw bytes for storage.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}

/// Convert raw bytes back to an f32 embedding.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
