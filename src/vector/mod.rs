//! Vector-store abstraction with two interchangeable backends.
//!
//! [`embedded`] keeps vectors co-located with the relational records in
//! SQLite (vec0 ANN index + exact-cosine re-scoring, full-scan fallback).
//! [`sidecar`] manages a Qdrant-style child process reachable over local
//! HTTP with quantized storage for larger corpora. Both backends must
//! produce equivalent top-k rankings within numerical tolerance — callers
//! may substitute one for the other freely.

pub mod embedded;
pub mod sidecar;
pub mod wire;

use async_trait::async_trait;

use crate::error::Result;

/// Similarities at or below this are treated as noise and dropped.
pub const NOISE_FLOOR: f64 = 0.1;

/// ANN over-fetch factor: approximate candidates are re-scored exactly.
pub const ANN_CANDIDATE_MULTIPLIER: usize = 3;

/// Payload stored alongside each vector.
#[derive(Debug, Clone)]
pub struct PointMetadata {
    pub project: String,
    pub deleted: bool,
}

/// One entry of an [`VectorStore::upsert_batch`] call.
#[derive(Debug, Clone)]
pub struct UpsertItem {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: PointMetadata,
}

/// Search-time filter. `project = Some(p)` keeps points owned by `p` or by
/// the global scope; `min_score` is a similarity threshold.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub project: Option<String>,
    pub exclude_deleted: bool,
    pub exclude_ids: Vec<String>,
    pub min_score: Option<f64>,
}

/// A search hit. `score` is cosine similarity clamped to `[0, 1]`, higher is
/// more similar. Ordering among exact ties is unspecified.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f64,
}

/// Contract shared by both backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// `false` signals the backend is unavailable; callers degrade rather
    /// than treat this as an error.
    fn is_ready(&self) -> bool;

    async fn upsert(&self, id: &str, embedding: &[f32], metadata: &PointMetadata) -> Result<()>;

    /// Returns the number of items written.
    async fn upsert_batch(&self, items: &[UpsertItem]) -> Result<usize>;

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<ScoredPoint>>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn count(&self) -> Result<usize>;

    /// Release resources. For the sidecar backend this terminates the child
    /// process even if the network client already failed.
    async fn close(&self) -> Result<()>;
}

/// Sort scored points descending and truncate. Shared by both backends so
/// their output ordering matches.
pub(crate) fn finalize_results(
    mut points: Vec<ScoredPoint>,
    limit: usize,
    min_score: Option<f64>,
) -> Vec<ScoredPoint> {
    points.retain(|p| p.score > NOISE_FLOOR);
    if let Some(min) = min_score {
        points.retain(|p| p.score >= min);
    }
    points.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    points.truncate(limit);
    points
}
