//! Error taxonomy for the memory core.
//!
//! Advisory subsystems (semantic search, contradiction detection, NLI) degrade
//! instead of failing the caller: their errors are caught at the orchestrator
//! and logged. The variants here separate transient failures ([`EngramError::StoreBusy`])
//! from permanent ones (not-found, validation) so callers can retry correctly.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngramError>;

#[derive(Debug, Error)]
pub enum EngramError {
    /// The embedding provider could not produce a vector. Non-fatal: the
    /// record is stored without an embedding and semantic layers are skipped.
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The vector backend rejected or failed an operation. Non-fatal: search
    /// falls back to lexical-only results.
    #[error("vector backend unavailable: {0}")]
    VectorBackendUnavailable(String),

    /// A vector of the wrong dimension was handed to a vector store. The
    /// vector is rejected; the owning memory is treated as embedding-less.
    #[error("invalid embedding dimension: expected {expected}, got {got}")]
    InvalidEmbeddingDimension { expected: usize, got: usize },

    /// The NLI provider failed. Only the NLI detection tier is skipped.
    #[error("NLI provider unavailable: {0}")]
    NliUnavailable(String),

    /// The sidecar process crashed or never became healthy. The store reports
    /// not-ready; callers fall back to the embedded backend.
    #[error("sidecar unavailable: {0}")]
    SidecarUnavailable(String),

    /// SQLite lock contention that survived bounded retry. Transient —
    /// distinct from not-found and validation failures.
    #[error("store busy after retries")]
    StoreBusy,

    #[error("memory not found: {0}")]
    NotFound(String),

    /// Rejected before any side effect (oversized content, malformed project
    /// name, out-of-range scores).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngramError {
    /// `true` for failures worth retrying at the call site.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreBusy | Self::VectorBackendUnavailable(_))
    }
}

/// Run `op` with bounded retry on SQLITE_BUSY. Backoff grows linearly with
/// the attempt number; all other errors pass through on the first occurrence.
pub fn retry_on_busy<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    const MAX_ATTEMPTS: u32 = 5;
    const BACKOFF_MS: u64 = 50;

    for attempt in 1..=MAX_ATTEMPTS {
        match op() {
            Err(EngramError::Db(e)) if is_busy(&e) => {
                if attempt == MAX_ATTEMPTS {
                    tracing::warn!(attempt, "database still busy, giving up");
                    return Err(EngramError::StoreBusy);
                }
                std::thread::sleep(std::time::Duration::from_millis(
                    BACKOFF_MS * attempt as u64,
                ));
            }
            other => return other,
        }
    }
    Err(EngramError::StoreBusy)
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::DatabaseBusy | rusqlite::ffi::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(EngramError::StoreBusy.is_transient());
        assert!(EngramError::VectorBackendUnavailable("down".into()).is_transient());
        assert!(!EngramError::NotFound("x".into()).is_transient());
        assert!(!EngramError::Validation("bad".into()).is_transient());
    }

    #[test]
    fn retry_passes_through_non_busy_errors() {
        let mut calls = 0;
        let result: Result<()> = retry_on_busy(|| {
            calls += 1;
            Err(EngramError::NotFound("abc".into()))
        });
        assert!(matches!(result, Err(EngramError::NotFound(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn retry_returns_success() {
        let result = retry_on_busy(|| Ok(42));
        assert_eq!(result.unwrap(), 42);
    }
}
