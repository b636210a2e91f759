//! Memory store orchestrator.
//!
//! [`MemoryStore`] owns record CRUD and wires the subsystems together: the
//! embedding provider on every write, the vector store for upserts and
//! semantic search, the contradiction detector on store/update, and the
//! confidence/retention models on every read. Search and contradiction
//! detection are advisory — no failure in them may prevent a plain store or
//! recall from completing.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::config::EngramConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{retry_on_busy, EngramError, Result};
use crate::memory::cache::{CacheKey, QueryCache, WriteKind};
use crate::memory::confidence::{self, ConfidenceLevel};
use crate::memory::contradiction::{
    self, CandidateMemory, Conflict, DetectionMode, ScanOutcome,
};
use crate::memory::retention::{self, RetentionLevel};
use crate::memory::search::{self, SearchHit};
use crate::memory::types::{
    ContradictionKind, EdgeRelation, MemoryRecord, MemoryType, GLOBAL_PROJECT, MAX_TAGS,
    MAX_TAG_LEN,
};
use crate::memory::{days_between, edges, now_rfc3339, write_audit_log};
use crate::nli::NliProvider;
use crate::vector::embedded::{bytes_to_embedding, embedding_to_bytes, EmbeddedVectorStore};
use crate::vector::sidecar::SidecarVectorStore;
use crate::vector::{PointMetadata, VectorStore};

/// Parameters for a store operation.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub content: String,
    pub memory_type: MemoryType,
    pub tags: Vec<String>,
    pub importance: Option<f64>,
    pub confidence: Option<f64>,
    pub project: String,
}

/// Result of a store or update: the persisted record plus any conflicts the
/// passive scan surfaced.
#[derive(Debug, Serialize)]
pub struct StoreOutcome {
    pub record: MemoryRecord,
    pub conflicts: Vec<Conflict>,
}

/// A recalled record with its decay-adjusted annotations.
#[derive(Debug, Serialize)]
pub struct RecalledMemory {
    #[serde(flatten)]
    pub record: MemoryRecord,
    pub effective_confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub retention: f64,
    pub retention_level: RetentionLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caution: Option<&'static str>,
}

/// Partial-field update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdatePatch {
    pub content: Option<String>,
    pub memory_type: Option<MemoryType>,
    pub tags: Option<Vec<String>>,
    pub importance: Option<f64>,
    pub confidence: Option<f64>,
}

/// Confidence revision actions, matched exhaustively.
#[derive(Debug, Clone)]
pub enum ReviseAction {
    /// Independent confirmation. `source` optionally names the confirming
    /// memory, creating a `confirms` edge.
    Confirm { source: Option<String> },
    /// Explicit contradiction by another memory.
    Contradict { with: String },
}

#[derive(Debug, Serialize)]
pub struct DeleteOutcome {
    pub id: String,
    pub permanent: bool,
}

pub struct MemoryStore {
    conn: Arc<Mutex<Connection>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    vectors: Arc<dyn VectorStore>,
    nli: Option<Arc<dyn NliProvider>>,
    cache: QueryCache,
    config: EngramConfig,
}

impl MemoryStore {
    /// Assemble a store from parts. Prefer [`MemoryStore::open`] outside tests.
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        vectors: Arc<dyn VectorStore>,
        nli: Option<Arc<dyn NliProvider>>,
        config: EngramConfig,
    ) -> Self {
        let cache = QueryCache::new(Duration::from_secs(config.retrieval.cache_ttl_secs));
        Self {
            conn,
            embedder,
            vectors,
            nli,
            cache,
            config,
        }
    }

    /// Full bootstrap from config: open the database, create providers, and
    /// bring up the configured vector backend. A sidecar that fails to start
    /// falls back to the embedded backend rather than failing the open.
    pub async fn open(config: EngramConfig) -> Result<Self> {
        let conn = crate::db::open_database(config.resolved_db_path())?;
        let conn = Arc::new(Mutex::new(conn));

        let embedder: Option<Arc<dyn EmbeddingProvider>> =
            match crate::embedding::create_provider(&config.embedding) {
                Ok(provider) => Some(Arc::from(provider)),
                Err(e) => {
                    tracing::warn!(error = %e, "embedding provider unavailable, lexical-only mode");
                    None
                }
            };

        let vectors: Arc<dyn VectorStore> = match config.vector.backend.as_str() {
            "sidecar" => {
                let sidecar = SidecarVectorStore::new(config.vector.sidecar.clone())?;
                match sidecar.start().await {
                    Ok(()) => Arc::new(sidecar),
                    Err(e) => {
                        tracing::warn!(error = %e, "sidecar unavailable, using embedded backend");
                        Arc::new(EmbeddedVectorStore::new(Arc::clone(&conn)))
                    }
                }
            }
            _ => Arc::new(EmbeddedVectorStore::new(Arc::clone(&conn))),
        };

        let nli: Option<Arc<dyn NliProvider>> = match crate::nli::create_provider(&config.nli) {
            Ok(Some(provider)) => Some(Arc::from(provider)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "NLI provider unavailable, skipping NLI tier");
                None
            }
        };

        Ok(Self::new(conn, embedder, vectors, nli, config))
    }

    /// Release the vector backend (terminates a sidecar child process).
    pub async fn close(&self) -> Result<()> {
        self.vectors.close().await
    }

    // ── Store ────────────────────────────────────────────────────────────────

    /// Full write path: validate → embed → persist → vector upsert →
    /// passive contradiction scan → edges. Only validation and the record
    /// insert itself can fail the call.
    pub async fn store(&self, request: StoreRequest) -> Result<StoreOutcome> {
        self.validate_store(&request)?;

        let embedding = self.embed(&request.content).await;

        let importance = request.importance.unwrap_or(0.5);
        let floor = confidence::confidence_floor(importance);
        let confidence = request
            .confidence
            .unwrap_or(0.7)
            .clamp(floor, 1.0);

        let id = uuid::Uuid::now_v7().to_string();
        let now = now_rfc3339();
        let tags_json = serde_json::to_string(&request.tags)
            .map_err(|e| EngramError::Validation(format!("tags not serializable: {e}")))?;

        {
            let mut conn = self.conn.lock().expect("connection lock poisoned");
            retry_on_busy(|| {
                insert_record(
                    &mut conn,
                    &id,
                    &request,
                    importance,
                    confidence,
                    &tags_json,
                    embedding.as_deref(),
                    &now,
                )
            })?;
        }

        self.upsert_vector(&id, embedding.as_deref(), &request.project, false)
            .await;

        let conflicts = self
            .scan_for_conflicts(
                &request.content,
                embedding.as_deref(),
                &request.project,
                Some(&id),
                DetectionMode::Passive,
            )
            .await
            .conflicts;

        if !conflicts.is_empty() {
            let conn = self.conn.lock().expect("connection lock poisoned");
            if let Err(e) = persist_conflicts(&conn, &id, &conflicts) {
                tracing::warn!(error = %e, id = %id, "failed to persist contradiction edges");
            }
        }

        self.cache.invalidate(WriteKind::Store);

        let record = {
            let conn = self.conn.lock().expect("connection lock poisoned");
            fetch_record(&conn, &id)?.ok_or_else(|| EngramError::NotFound(id.clone()))?
        };

        tracing::info!(
            id = %record.id,
            project = %record.project,
            conflicts = conflicts.len(),
            "memory stored"
        );

        Ok(StoreOutcome { record, conflicts })
    }

    // ── Recall ───────────────────────────────────────────────────────────────

    /// Fetch one memory by id with decay-adjusted annotations, applying the
    /// access boost. Tombstoned or out-of-scope ids report not-found.
    pub async fn recall(&self, id: &str, project: &str) -> Result<RecalledMemory> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        let record = fetch_record(&conn, id)?
            .filter(|r| r.deleted_at.is_none() && r.visible_from(project))
            .ok_or_else(|| EngramError::NotFound(id.to_string()))?;

        let annotated = self.annotate(&record);
        search::apply_access_boost(&conn, &[id], &self.config.retention)?;
        Ok(annotated)
    }

    // ── Update ───────────────────────────────────────────────────────────────

    /// Partial update. A content change re-embeds the record and re-runs the
    /// passive contradiction scan.
    pub async fn update(
        &self,
        id: &str,
        patch: UpdatePatch,
        project: &str,
    ) -> Result<StoreOutcome> {
        let existing = {
            let conn = self.conn.lock().expect("connection lock poisoned");
            fetch_record(&conn, id)?
                .filter(|r| r.deleted_at.is_none() && r.visible_from(project))
                .ok_or_else(|| EngramError::NotFound(id.to_string()))?
        };

        let content_changed = patch
            .content
            .as_deref()
            .is_some_and(|c| c != existing.content);
        if let Some(ref content) = patch.content {
            self.validate_content(content)?;
        }
        if let Some(ref tags) = patch.tags {
            validate_tags(tags)?;
        }
        for score in [patch.importance, patch.confidence].into_iter().flatten() {
            if !(0.0..=1.0).contains(&score) {
                return Err(EngramError::Validation(
                    "importance and confidence must be within [0, 1]".into(),
                ));
            }
        }

        let new_content = patch.content.clone().unwrap_or_else(|| existing.content.clone());
        let embedding = if content_changed {
            self.embed(&new_content).await
        } else {
            existing.embedding.clone()
        };

        {
            let mut conn = self.conn.lock().expect("connection lock poisoned");
            retry_on_busy(|| {
                apply_update(
                    &mut conn,
                    &existing,
                    &patch,
                    content_changed,
                    embedding.as_deref(),
                )
            })?;
        }

        if content_changed {
            self.upsert_vector(id, embedding.as_deref(), &existing.project, false)
                .await;
        }

        let conflicts = if content_changed {
            let outcome = self
                .scan_for_conflicts(
                    &new_content,
                    embedding.as_deref(),
                    project,
                    Some(id),
                    DetectionMode::Passive,
                )
                .await;
            let conn = self.conn.lock().expect("connection lock poisoned");
            if let Err(e) = persist_conflicts(&conn, id, &outcome.conflicts) {
                tracing::warn!(error = %e, id = %id, "failed to persist contradiction edges");
            }
            outcome.conflicts
        } else {
            Vec::new()
        };

        self.cache.invalidate(WriteKind::Update);

        let record = {
            let conn = self.conn.lock().expect("connection lock poisoned");
            fetch_record(&conn, id)?.ok_or_else(|| EngramError::NotFound(id.to_string()))?
        };
        Ok(StoreOutcome { record, conflicts })
    }

    // ── Revise (confirm / contradict) ────────────────────────────────────────

    /// Confidence-only mutation plus edge creation.
    pub async fn revise(
        &self,
        id: &str,
        action: ReviseAction,
        project: &str,
    ) -> Result<MemoryRecord> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        fetch_record(&conn, id)?
            .filter(|r| r.deleted_at.is_none() && r.visible_from(project))
            .ok_or_else(|| EngramError::NotFound(id.to_string()))?;

        match action {
            ReviseAction::Confirm { source } => {
                conn.execute(
                    "UPDATE memories SET source_count = source_count + 1, \
                     confidence = MIN(confidence + 0.1, 1.0) WHERE id = ?1",
                    params![id],
                )?;
                if let Some(ref source_id) = source {
                    let source_record = fetch_record(&conn, source_id)?
                        .filter(|r| r.deleted_at.is_none())
                        .ok_or_else(|| EngramError::NotFound(source_id.clone()))?;
                    edges::create_edge(
                        &conn,
                        &source_record.id,
                        id,
                        EdgeRelation::Confirms,
                        1.0,
                        None,
                    )?;
                }
                write_audit_log(
                    &conn,
                    "confirm",
                    id,
                    Some(&serde_json::json!({"source": source})),
                )?;
            }
            ReviseAction::Contradict { with } => {
                let other = fetch_record(&conn, &with)?
                    .filter(|r| r.deleted_at.is_none())
                    .ok_or_else(|| EngramError::NotFound(with.clone()))?;

                edges::create_edge(
                    &conn,
                    &other.id,
                    id,
                    EdgeRelation::ContradictsManual,
                    1.0,
                    None,
                )?;
                for memory_id in [id, other.id.as_str()] {
                    let count = edges::active_contradiction_count(&conn, memory_id)?;
                    conn.execute(
                        "UPDATE memories SET contradiction_count = ?1 WHERE id = ?2",
                        params![count, memory_id],
                    )?;
                }
                write_audit_log(
                    &conn,
                    "contradict",
                    id,
                    Some(&serde_json::json!({"with": with})),
                )?;
            }
        }

        self.cache.invalidate(WriteKind::Revise);
        fetch_record(&conn, id)?.ok_or_else(|| EngramError::NotFound(id.to_string()))
    }

    // ── Delete ───────────────────────────────────────────────────────────────

    /// Soft delete sets the tombstone and flags the vector point deleted;
    /// permanent delete removes the record, its FTS entry, its vector, and
    /// (by cascade) all edges referencing it.
    pub async fn delete(&self, id: &str, permanent: bool, project: &str) -> Result<DeleteOutcome> {
        let record = {
            let conn = self.conn.lock().expect("connection lock poisoned");
            fetch_record(&conn, id)?
                .filter(|r| r.visible_from(project))
                .ok_or_else(|| EngramError::NotFound(id.to_string()))?
        };

        if permanent {
            {
                let mut conn = self.conn.lock().expect("connection lock poisoned");
                retry_on_busy(|| hard_delete(&mut conn, &record))?;
            }
            if let Err(e) = self.vectors.delete(id).await {
                tracing::warn!(error = %e, id = %id, "vector delete failed");
            }
        } else {
            {
                let conn = self.conn.lock().expect("connection lock poisoned");
                conn.execute(
                    "UPDATE memories SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                    params![now_rfc3339(), id],
                )?;
                write_audit_log(
                    &conn,
                    "delete",
                    id,
                    Some(&serde_json::json!({"permanent": false})),
                )?;
            }
            // Keep the vector but flag it so filtered searches skip it
            self.upsert_vector(id, record.embedding.as_deref(), &record.project, true)
                .await;
        }

        self.cache.invalidate(WriteKind::Delete);
        Ok(DeleteOutcome {
            id: id.to_string(),
            permanent,
        })
    }

    // ── Search ───────────────────────────────────────────────────────────────

    /// Hybrid search with per-query caching. Results are annotated and access
    /// bookkeeping applies to returned memories.
    pub async fn search(
        &self,
        query: &str,
        project: &str,
        limit: usize,
        min_confidence: f64,
    ) -> Result<Vec<SearchHit>> {
        let key = CacheKey {
            query: query.to_string(),
            project: project.to_string(),
            limit,
            min_confidence_milli: (min_confidence * 1000.0) as u32,
        };
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let embedding = self.embed(query).await;
        let hits = search::hybrid_search(
            Arc::clone(&self.conn),
            Arc::clone(&self.vectors),
            query,
            embedding,
            project,
            limit,
            min_confidence,
            &self.config.retrieval,
            &self.config.retention,
        )
        .await?;

        self.cache.put(key, hits.clone());
        Ok(hits)
    }

    // ── Contradiction scans ──────────────────────────────────────────────────

    /// On-demand wide scan with structured stats.
    pub async fn proactive_check(&self, content: &str, project: &str) -> Result<ScanOutcome> {
        self.validate_content(content)?;
        let embedding = self.embed(content).await;
        Ok(self
            .scan_for_conflicts(
                content,
                embedding.as_deref(),
                project,
                None,
                DetectionMode::Proactive,
            )
            .await)
    }

    /// Candidate assembly + detector invocation. Never fails: candidate
    /// errors degrade to an empty scan.
    async fn scan_for_conflicts(
        &self,
        content: &str,
        embedding: Option<&[f32]>,
        project: &str,
        exclude_id: Option<&str>,
        mode: DetectionMode,
    ) -> ScanOutcome {
        let window = match mode {
            DetectionMode::Passive => self.config.detector.passive_candidate_window,
            DetectionMode::Proactive => self.config.detector.proactive_candidate_window,
        };

        let candidates = {
            let conn = self.conn.lock().expect("connection lock poisoned");
            match recent_candidates(&conn, project, exclude_id, window) {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!(error = %e, "candidate query failed, skipping scan");
                    Vec::new()
                }
            }
        };

        contradiction::detect(
            content,
            embedding,
            &candidates,
            self.nli.as_deref(),
            mode,
            &self.config.detector,
        )
        .await
    }

    // ── Maintenance / stats passthrough ──────────────────────────────────────

    /// Retention-based archive sweep. See [`crate::memory::maintenance`].
    pub async fn archive_sweep(&self, dry_run: bool) -> Result<super::maintenance::ArchiveResult> {
        let result = {
            let conn = self.conn.lock().expect("connection lock poisoned");
            super::maintenance::archive_sweep(&conn, &self.config.retention, dry_run)?
        };
        if !dry_run {
            self.cache.invalidate(WriteKind::Archive);
        }
        Ok(result)
    }

    pub fn stats(&self, project: Option<&str>) -> Result<super::stats::StatsResponse> {
        let conn = self.conn.lock().expect("connection lock poisoned");
        super::stats::memory_stats(&conn, project, None)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// Embed text, treating any failure as unavailability.
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let provider = self.embedder.as_ref()?;
        let provider = Arc::clone(provider);
        let text = text.to_string();
        let result = tokio::task::spawn_blocking(move || provider.embed(&text)).await;
        match result {
            Ok(Ok(embedding)) => Some(embedding),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "embedding failed, storing without vector");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding task failed, storing without vector");
                None
            }
        }
    }

    /// Best-effort vector upsert; failures only degrade semantic search.
    async fn upsert_vector(
        &self,
        id: &str,
        embedding: Option<&[f32]>,
        project: &str,
        deleted: bool,
    ) {
        let Some(embedding) = embedding else { return };
        let metadata = PointMetadata {
            project: project.to_string(),
            deleted,
        };
        if let Err(e) = self.vectors.upsert(id, embedding, &metadata).await {
            tracing::warn!(error = %e, id = %id, "vector upsert failed");
        }
    }

    fn annotate(&self, record: &MemoryRecord) -> RecalledMemory {
        let now = now_rfc3339();
        let reference = record
            .last_accessed
            .as_deref()
            .unwrap_or(&record.created_at);
        let days_idle = days_between(reference, &now);

        let effective = confidence::effective_confidence(
            record.confidence,
            days_idle,
            record.source_count,
            record.contradiction_count,
            record.importance,
        );
        let level = confidence::confidence_level(effective);
        let ret = retention::retention(
            days_idle * 24.0,
            record.strength,
            record.importance,
            &self.config.retention,
        );

        RecalledMemory {
            record: record.clone(),
            effective_confidence: effective,
            confidence_level: level,
            retention: ret,
            retention_level: retention::retention_level(ret),
            caution: level.caution(),
        }
    }

    fn validate_store(&self, request: &StoreRequest) -> Result<()> {
        self.validate_content(&request.content)?;
        validate_project(&request.project)?;
        validate_tags(&request.tags)?;
        for score in [request.importance, request.confidence].into_iter().flatten() {
            if !(0.0..=1.0).contains(&score) {
                return Err(EngramError::Validation(
                    "importance and confidence must be within [0, 1]".into(),
                ));
            }
        }
        Ok(())
    }

    fn validate_content(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(EngramError::Validation("content must not be empty".into()));
        }
        let max = self.config.storage.max_content_bytes;
        if content.len() > max {
            return Err(EngramError::Validation(format!(
                "content exceeds {max} bytes"
            )));
        }
        Ok(())
    }
}

fn validate_project(project: &str) -> Result<()> {
    if project.is_empty() || project.len() > 64 {
        return Err(EngramError::Validation(
            "project must be 1..=64 characters".into(),
        ));
    }
    if !project
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(EngramError::Validation(
            "project may contain only alphanumerics, '-' and '_'".into(),
        ));
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<()> {
    if tags.len() > MAX_TAGS {
        return Err(EngramError::Validation(format!(
            "at most {MAX_TAGS} tags allowed"
        )));
    }
    if let Some(bad) = tags.iter().find(|t| t.is_empty() || t.len() > MAX_TAG_LEN) {
        return Err(EngramError::Validation(format!(
            "tag out of bounds (1..={MAX_TAG_LEN} bytes): {bad:?}"
        )));
    }
    Ok(())
}

// ── Sync SQL helpers ──────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn insert_record(
    conn: &mut Connection,
    id: &str,
    request: &StoreRequest,
    importance: f64,
    confidence: f64,
    tags_json: &str,
    embedding: Option<&[f32]>,
    now: &str,
) -> Result<()> {
    let tx = conn.transaction()?;

    let embedding_bytes = embedding.map(embedding_to_bytes);
    tx.execute(
        "INSERT INTO memories (id, project, type, content, tags, importance, confidence, \
         strength, source_count, contradiction_count, access_count, created_at, embedding) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1.0, 1, 0, 0, ?8, ?9)",
        params![
            id,
            request.project,
            request.memory_type.as_str(),
            request.content,
            tags_json,
            importance,
            confidence,
            now,
            embedding_bytes,
        ],
    )?;
    let rowid = tx.last_insert_rowid();

    tx.execute(
        "INSERT INTO memories_fts (rowid, content, id) VALUES (?1, ?2, ?3)",
        params![rowid, request.content, id],
    )?;

    write_audit_log(&tx, "create", id, None)?;
    tx.commit()?;
    Ok(())
}

fn apply_update(
    conn: &mut Connection,
    existing: &MemoryRecord,
    patch: &UpdatePatch,
    content_changed: bool,
    embedding: Option<&[f32]>,
) -> Result<()> {
    let tx = conn.transaction()?;

    let content = patch.content.as_deref().unwrap_or(&existing.content);
    let memory_type = patch.memory_type.unwrap_or(existing.memory_type);
    let tags = patch.tags.clone().unwrap_or_else(|| existing.tags.clone());
    let tags_json = serde_json::to_string(&tags)
        .map_err(|e| EngramError::Validation(format!("tags not serializable: {e}")))?;
    let importance = patch.importance.unwrap_or(existing.importance);
    let confidence = patch
        .confidence
        .unwrap_or(existing.confidence)
        .clamp(confidence::confidence_floor(importance), 1.0);

    let embedding_bytes = embedding.map(embedding_to_bytes);
    tx.execute(
        "UPDATE memories SET content = ?1, type = ?2, tags = ?3, importance = ?4, \
         confidence = ?5, embedding = ?6 WHERE id = ?7",
        params![
            content,
            memory_type.as_str(),
            tags_json,
            importance,
            confidence,
            embedding_bytes,
            existing.id,
        ],
    )?;

    if content_changed {
        // External-content FTS5 requires a paired delete + insert
        let rowid: i64 = tx.query_row(
            "SELECT rowid FROM memories WHERE id = ?1",
            params![existing.id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO memories_fts(memories_fts, rowid, content, id) VALUES('delete', ?1, ?2, ?3)",
            params![rowid, existing.content, existing.id],
        )?;
        tx.execute(
            "INSERT INTO memories_fts (rowid, content, id) VALUES (?1, ?2, ?3)",
            params![rowid, content, existing.id],
        )?;
    }

    write_audit_log(
        &tx,
        "update",
        &existing.id,
        Some(&serde_json::json!({"content_changed": content_changed})),
    )?;
    tx.commit()?;
    Ok(())
}

fn hard_delete(conn: &mut Connection, record: &MemoryRecord) -> Result<()> {
    let tx = conn.transaction()?;

    let rowid: i64 = tx.query_row(
        "SELECT rowid FROM memories WHERE id = ?1",
        params![record.id],
        |row| row.get(0),
    )?;
    tx.execute(
        "INSERT INTO memories_fts(memories_fts, rowid, content, id) VALUES('delete', ?1, ?2, ?3)",
        params![rowid, record.content, record.id],
    )?;

    // Audit before the row goes away; memory_log keeps ids as plain text
    write_audit_log(
        &tx,
        "delete",
        &record.id,
        Some(&serde_json::json!({"permanent": true})),
    )?;

    // Cascades to edges via FK
    tx.execute("DELETE FROM memories WHERE id = ?1", params![record.id])?;

    tx.commit()?;
    Ok(())
}

/// Persist detected conflicts as edges and refresh contradiction counts on
/// both endpoints.
fn persist_conflicts(conn: &Connection, new_id: &str, conflicts: &[Conflict]) -> Result<()> {
    for conflict in conflicts {
        edges::create_edge(
            conn,
            new_id,
            &conflict.id,
            EdgeRelation::Contradicts(conflict.kind),
            conflict.confidence,
            Some(&conflict.evidence),
        )?;
        write_audit_log(
            conn,
            "contradict",
            &conflict.id,
            Some(&serde_json::json!({
                "by": new_id,
                "kind": conflict.kind.as_str(),
            })),
        )?;
    }
    // Recompute from active edges so repeated scans stay consistent
    let mut touched: Vec<&str> = conflicts.iter().map(|c| c.id.as_str()).collect();
    touched.push(new_id);
    for memory_id in touched {
        let count = edges::active_contradiction_count(conn, memory_id)?;
        conn.execute(
            "UPDATE memories SET contradiction_count = ?1 WHERE id = ?2",
            params![count, memory_id],
        )?;
    }
    Ok(())
}

/// Most recent non-deleted, scope-visible candidates for the detector.
fn recent_candidates(
    conn: &Connection,
    project: &str,
    exclude_id: Option<&str>,
    window: usize,
) -> Result<Vec<CandidateMemory>> {
    let mut stmt = conn.prepare(
        "SELECT id, content, embedding FROM memories \
         WHERE deleted_at IS NULL AND (project = ?1 OR project = ?2) AND id != ?3 \
         ORDER BY created_at DESC LIMIT ?4",
    )?;
    let candidates = stmt
        .query_map(
            params![project, GLOBAL_PROJECT, exclude_id.unwrap_or(""), window as i64],
            |row| {
                let blob: Option<Vec<u8>> = row.get(2)?;
                Ok(CandidateMemory {
                    id: row.get(0)?,
                    content: row.get(1)?,
                    embedding: blob.map(|b| bytes_to_embedding(&b)),
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(candidates)
}

/// Fetch a full record by id, tombstoned or not.
pub(crate) fn fetch_record(conn: &Connection, id: &str) -> Result<Option<MemoryRecord>> {
    let record = conn
        .query_row(
            "SELECT id, project, type, content, tags, importance, confidence, strength, \
             source_count, contradiction_count, access_count, created_at, last_accessed, \
             deleted_at, embedding FROM memories WHERE id = ?1",
            params![id],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let type_str: String = row.get(2)?;
    let tags_json: String = row.get(4)?;
    let blob: Option<Vec<u8>> = row.get(14)?;
    Ok(MemoryRecord {
        id: row.get(0)?,
        project: row.get(1)?,
        memory_type: MemoryType::from_str(&type_str).unwrap_or(MemoryType::Note),
        content: row.get(3)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        importance: row.get(5)?,
        confidence: row.get(6)?,
        strength: row.get(7)?,
        source_count: row.get(8)?,
        contradiction_count: row.get(9)?,
        access_count: row.get(10)?,
        created_at: row.get(11)?,
        last_accessed: row.get(12)?,
        deleted_at: row.get(13)?,
        embedding: blob.map(|b| bytes_to_embedding(&b)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::GLOBAL_PROJECT;

    /// Deterministic bag-of-words embedder for tests.
    struct BowEmbedder;

    impl EmbeddingProvider for BowEmbedder {
        fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            let mut v = vec![0.0f32; crate::embedding::EMBEDDING_DIM];
            for word in text.to_lowercase().split_whitespace() {
                let mut h: usize = 5381;
                for b in word.bytes() {
                    h = h.wrapping_mul(33).wrapping_add(b as usize);
                }
                v[h % crate::embedding::EMBEDDING_DIM] += 1.0;
            }
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                v.iter_mut().for_each(|x| *x /= norm);
            }
            Ok(v)
        }
    }

    fn test_store() -> MemoryStore {
        let conn = Arc::new(Mutex::new(crate::db::open_memory_database().unwrap()));
        let vectors = Arc::new(EmbeddedVectorStore::new(Arc::clone(&conn)));
        MemoryStore::new(
            conn,
            Some(Arc::new(BowEmbedder)),
            vectors,
            None,
            EngramConfig::default(),
        )
    }

    fn request(content: &str, project: &str) -> StoreRequest {
        StoreRequest {
            content: content.into(),
            memory_type: MemoryType::Fact,
            tags: vec![],
            importance: None,
            confidence: None,
            project: project.into(),
        }
    }

    #[tokio::test]
    async fn store_then_recall_round_trips() {
        let store = test_store();
        let outcome = store
            .store(request("The deploy pipeline uses blue green rollouts", GLOBAL_PROJECT))
            .await
            .unwrap();
        assert!(outcome.conflicts.is_empty());

        let recalled = store.recall(&outcome.record.id, GLOBAL_PROJECT).await.unwrap();
        assert_eq!(
            recalled.record.content,
            "The deploy pipeline uses blue green rollouts"
        );
        assert!(recalled.effective_confidence > 0.0);
        assert_eq!(recalled.retention_level, RetentionLevel::Strong);
    }

    #[tokio::test]
    async fn recall_applies_access_bookkeeping() {
        let store = test_store();
        let outcome = store.store(request("Strength grows on recall", GLOBAL_PROJECT)).await.unwrap();
        let before = outcome.record.strength;

        store.recall(&outcome.record.id, GLOBAL_PROJECT).await.unwrap();

        let conn = store.conn.lock().unwrap();
        let after = fetch_record(&conn, &outcome.record.id).unwrap().unwrap();
        assert!(after.strength > before);
        assert_eq!(after.access_count, 1);
        assert!(after.last_accessed.is_some());
    }

    #[tokio::test]
    async fn factual_conflict_detected_on_store() {
        let store = test_store();
        let first = store
            .store(request("The server uses Python 3.11", GLOBAL_PROJECT))
            .await
            .unwrap();
        assert!(first.conflicts.is_empty());

        let second = store
            .store(request("The server uses Python 3.9", GLOBAL_PROJECT))
            .await
            .unwrap();
        assert_eq!(second.conflicts.len(), 1);
        assert_eq!(second.conflicts[0].id, first.record.id);
        assert_eq!(second.conflicts[0].kind, ContradictionKind::Factual);

        // Edge persisted and counts bumped on both endpoints
        let conn = store.conn.lock().unwrap();
        let edges = edges::active_edges_for(&conn, &first.record.id).unwrap();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].relation.is_contradiction());
        let old = fetch_record(&conn, &first.record.id).unwrap().unwrap();
        let new = fetch_record(&conn, &second.record.id).unwrap().unwrap();
        assert_eq!(old.contradiction_count, 1);
        assert_eq!(new.contradiction_count, 1);
    }

    #[tokio::test]
    async fn negation_conflict_detected_on_store() {
        let store = test_store();
        let first = store
            .store(request("The API is not deprecated", GLOBAL_PROJECT))
            .await
            .unwrap();

        let second = store
            .store(request("The API is deprecated", GLOBAL_PROJECT))
            .await
            .unwrap();
        assert_eq!(second.conflicts.len(), 1);
        assert_eq!(second.conflicts[0].id, first.record.id);
        assert_eq!(second.conflicts[0].kind, ContradictionKind::Negation);
    }

    #[tokio::test]
    async fn scope_isolates_projects() {
        let store = test_store();
        let alpha = store.store(request("Alpha project secret", "alpha")).await.unwrap();

        // Not visible from another project
        let err = store.recall(&alpha.record.id, "beta").await;
        assert!(matches!(err, Err(EngramError::NotFound(_))));

        // Global memories are visible everywhere
        let global = store.store(request("Shared fact", GLOBAL_PROJECT)).await.unwrap();
        assert!(store.recall(&global.record.id, "beta").await.is_ok());
    }

    #[tokio::test]
    async fn soft_delete_hides_from_recall_and_search() {
        let store = test_store();
        let outcome = store
            .store(request("Ephemeral staging credentials note", GLOBAL_PROJECT))
            .await
            .unwrap();
        let id = outcome.record.id.clone();

        let deleted = store.delete(&id, false, GLOBAL_PROJECT).await.unwrap();
        assert!(!deleted.permanent);

        let err = store.recall(&id, GLOBAL_PROJECT).await;
        assert!(matches!(err, Err(EngramError::NotFound(_))));

        let hits = store
            .search("staging credentials", GLOBAL_PROJECT, 10, 0.0)
            .await
            .unwrap();
        assert!(!hits.iter().any(|h| h.id == id));

        // Tombstoned row is retained for audit
        let conn = store.conn.lock().unwrap();
        let record = fetch_record(&conn, &id).unwrap().unwrap();
        assert!(record.deleted_at.is_some());
    }

    #[tokio::test]
    async fn permanent_delete_removes_row_and_edges() {
        let store = test_store();
        let first = store
            .store(request("The cache backend is redis", GLOBAL_PROJECT))
            .await
            .unwrap();
        let second = store
            .store(request("The cache backend is memcached", GLOBAL_PROJECT))
            .await
            .unwrap();
        assert!(!second.conflicts.is_empty());

        store
            .delete(&first.record.id, true, GLOBAL_PROJECT)
            .await
            .unwrap();

        let conn = store.conn.lock().unwrap();
        assert!(fetch_record(&conn, &first.record.id).unwrap().is_none());
        let remaining = edges::active_edges_for(&conn, &second.record.id).unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn update_content_reembeds_and_rescans() {
        let store = test_store();
        let target = store
            .store(request("The queue uses rabbitmq", GLOBAL_PROJECT))
            .await
            .unwrap();
        let other = store
            .store(request("The scheduler runs hourly", GLOBAL_PROJECT))
            .await
            .unwrap();

        let patch = UpdatePatch {
            content: Some("The scheduler runs nightly".into()),
            ..Default::default()
        };
        let updated = store.update(&target.record.id, patch, GLOBAL_PROJECT).await.unwrap();
        assert_eq!(updated.record.content, "The scheduler runs nightly");
        // New content now factually conflicts with the other memory
        assert!(updated
            .conflicts
            .iter()
            .any(|c| c.id == other.record.id && c.kind == ContradictionKind::Factual));

        // Lexical index follows the new content
        let hits = store
            .search("scheduler nightly", GLOBAL_PROJECT, 10, 0.0)
            .await
            .unwrap();
        assert!(hits.iter().any(|h| h.id == target.record.id));
    }

    #[tokio::test]
    async fn update_metadata_only_skips_rescan() {
        let store = test_store();
        let outcome = store
            .store(request("Plain note without conflicts", GLOBAL_PROJECT))
            .await
            .unwrap();

        let patch = UpdatePatch {
            importance: Some(0.9),
            tags: Some(vec!["ops".into()]),
            ..Default::default()
        };
        let updated = store.update(&outcome.record.id, patch, GLOBAL_PROJECT).await.unwrap();
        assert!(updated.conflicts.is_empty());
        assert_eq!(updated.record.importance, 0.9);
        assert_eq!(updated.record.tags, vec!["ops".to_string()]);
    }

    #[tokio::test]
    async fn confirm_bumps_source_count_and_confidence() {
        let store = test_store();
        let outcome = store
            .store(StoreRequest {
                confidence: Some(0.7),
                ..request("Confirmed fact", GLOBAL_PROJECT)
            })
            .await
            .unwrap();

        let revised = store
            .revise(
                &outcome.record.id,
                ReviseAction::Confirm { source: None },
                GLOBAL_PROJECT,
            )
            .await
            .unwrap();
        assert_eq!(revised.source_count, 2);
        assert!((revised.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn contradict_creates_edge_and_bumps_counts() {
        let store = test_store();
        let a = store.store(request("Claim under dispute", GLOBAL_PROJECT)).await.unwrap();
        let b = store.store(request("Completely different topic entirely", GLOBAL_PROJECT)).await.unwrap();

        let revised = store
            .revise(
                &a.record.id,
                ReviseAction::Contradict {
                    with: b.record.id.clone(),
                },
                GLOBAL_PROJECT,
            )
            .await
            .unwrap();
        assert_eq!(revised.contradiction_count, 1);

        let conn = store.conn.lock().unwrap();
        let active = edges::active_edges_for(&conn, &a.record.id).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].relation, EdgeRelation::ContradictsManual);
    }

    #[tokio::test]
    async fn validation_rejects_before_side_effects() {
        let store = test_store();

        let empty = store.store(request("   ", GLOBAL_PROJECT)).await;
        assert!(matches!(empty, Err(EngramError::Validation(_))));

        let oversized = store
            .store(request(&"x".repeat(9000), GLOBAL_PROJECT))
            .await;
        assert!(matches!(oversized, Err(EngramError::Validation(_))));

        let bad_project = store.store(request("fine", "bad project!")).await;
        assert!(matches!(bad_project, Err(EngramError::Validation(_))));

        let conn = store.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "no partial writes from rejected requests");
    }

    #[tokio::test]
    async fn search_hits_are_cached_until_write() {
        let store = test_store();
        store
            .store(request("Cache invalidation test subject", GLOBAL_PROJECT))
            .await
            .unwrap();

        let first = store
            .search("cache invalidation", GLOBAL_PROJECT, 5, 0.0)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // A write invalidates; the follow-up search sees the new memory
        store
            .store(request("Cache invalidation second subject", GLOBAL_PROJECT))
            .await
            .unwrap();
        let second = store
            .search("cache invalidation", GLOBAL_PROJECT, 5, 0.0)
            .await
            .unwrap();
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn proactive_check_reports_stats() {
        let store = test_store();
        store
            .store(request("The gateway uses port 8443", GLOBAL_PROJECT))
            .await
            .unwrap();

        let outcome = store
            .proactive_check("The gateway uses port 9000", GLOBAL_PROJECT)
            .await
            .unwrap();
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.stats.candidates_considered, 1);
        assert_eq!(outcome.stats.by_kind.get("factual"), Some(&1));
    }

    #[tokio::test]
    async fn store_succeeds_without_embedder() {
        let conn = Arc::new(Mutex::new(crate::db::open_memory_database().unwrap()));
        let vectors = Arc::new(EmbeddedVectorStore::new(Arc::clone(&conn)));
        let store = MemoryStore::new(conn, None, vectors, None, EngramConfig::default());

        let outcome = store
            .store(request("Lexical only memory", GLOBAL_PROJECT))
            .await
            .unwrap();
        assert!(outcome.record.embedding.is_none());

        // Lexical search still finds it
        let hits = store
            .search("lexical only", GLOBAL_PROJECT, 5, 0.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
