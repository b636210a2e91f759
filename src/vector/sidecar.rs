//! Sidecar vector backend: a managed Qdrant-style child process.
//!
//! The store owns the process lifecycle through an explicit state machine
//! {NotStarted, Starting, Ready, Failed, Closed}; transitions happen only in
//! [`SidecarVectorStore::start`] and [`VectorStore::close`], never through
//! background restarts. Every network call carries explicit timeouts and any
//! failure surfaces as `is_ready() = false` rather than a panic from an
//! unrelated call site. Callers fall back to the embedded backend when this
//! store is not ready.

use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use super::wire::{
    AckResponse, CollectionInfoResponse, Condition, CreateCollectionRequest,
    CreateFieldIndexRequest, DeletePointsRequest, Distance, FieldSchema, Filter, MatchValue,
    PointPayload, PointStruct, QuantizationConfig, ScalarQuantization, SearchPointsRequest,
    SearchResponse, UpsertPointsRequest, VectorParams,
};
use super::{
    finalize_results, PointMetadata, ScoredPoint, UpsertItem, VectorFilter, VectorStore,
    NOISE_FLOOR,
};
use crate::config::SidecarConfig;
use crate::embedding::EMBEDDING_DIM;
use crate::error::{EngramError, Result};
use crate::memory::types::GLOBAL_PROJECT;

/// Interval between health-check polls while waiting for a spawned process.
const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Process lifecycle states. Transitions only through `start()` / `close()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarState {
    NotStarted,
    Starting,
    Ready,
    Failed,
    Closed,
}

pub struct SidecarVectorStore {
    cfg: SidecarConfig,
    http: reqwest::Client,
    state: StdMutex<SidecarState>,
    child: AsyncMutex<Option<tokio::process::Child>>,
}

impl SidecarVectorStore {
    pub fn new(cfg: SidecarConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(|e| EngramError::SidecarUnavailable(e.to_string()))?;

        Ok(Self {
            cfg,
            http,
            state: StdMutex::new(SidecarState::NotStarted),
            child: AsyncMutex::new(None),
        })
    }

    pub fn state(&self) -> SidecarState {
        *self.state.lock().expect("state lock poisoned")
    }

    fn set_state(&self, next: SidecarState) {
        *self.state.lock().expect("state lock poisoned") = next;
    }

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.cfg.host, self.cfg.port)
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url(), self.cfg.collection)
    }

    /// Bring the sidecar up: reuse a running instance when one answers the
    /// health check, otherwise resolve a binary, spawn it with isolated
    /// storage, and poll until healthy or timed out.
    pub async fn start(&self) -> Result<()> {
        match self.state() {
            SidecarState::Ready => return Ok(()),
            SidecarState::Closed => {
                return Err(EngramError::SidecarUnavailable("store is closed".into()))
            }
            _ => {}
        }
        self.set_state(SidecarState::Starting);

        let result = self.start_inner().await;
        match result {
            Ok(()) => {
                self.set_state(SidecarState::Ready);
                tracing::info!(url = %self.base_url(), "sidecar ready");
                Ok(())
            }
            Err(e) => {
                self.set_state(SidecarState::Failed);
                tracing::warn!(error = %e, "sidecar failed to start");
                Err(e)
            }
        }
    }

    async fn start_inner(&self) -> Result<()> {
        if self.health_check().await {
            tracing::info!(url = %self.base_url(), "reusing running sidecar instance");
        } else {
            let binary = self.resolve_binary().await?;
            self.spawn_process(&binary).await?;
            self.wait_healthy().await?;
        }
        self.ensure_collection().await
    }

    /// Resolution order: explicit override → binary on PATH → manual local
    /// install → on-demand download.
    async fn resolve_binary(&self) -> Result<PathBuf> {
        if let Some(ref explicit) = self.cfg.binary_path {
            let path = crate::config::expand_tilde(explicit);
            if path.exists() {
                return Ok(path);
            }
            return Err(EngramError::SidecarUnavailable(format!(
                "configured binary not found: {}",
                path.display()
            )));
        }

        if let Some(on_path) = find_on_path("qdrant") {
            return Ok(on_path);
        }

        let local = crate::config::default_engram_dir().join("bin/qdrant");
        if local.exists() {
            return Ok(local);
        }

        self.download_binary(&local).await?;
        Ok(local)
    }

    async fn download_binary(&self, dest: &PathBuf) -> Result<()> {
        let url = format!(
            "{}/qdrant-{}-{}.tar.gz",
            self.cfg.download_url,
            std::env::consts::ARCH,
            std::env::consts::OS
        );
        tracing::info!(%url, "downloading sidecar binary");

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| EngramError::SidecarUnavailable(format!("download failed: {e}")))?;
        if !response.status().is_success() {
            return Err(EngramError::SidecarUnavailable(format!(
                "download failed with HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngramError::SidecarUnavailable(format!("download read failed: {e}")))?;

        // Atomic write: tmp + rename
        let tmp = dest.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755)).await?;
        }
        tokio::fs::rename(&tmp, dest).await?;
        Ok(())
    }

    async fn spawn_process(&self, binary: &PathBuf) -> Result<()> {
        let storage = crate::config::expand_tilde(&self.cfg.storage_dir);
        let snapshots = crate::config::expand_tilde(&self.cfg.snapshot_dir);
        std::fs::create_dir_all(&storage)?;
        std::fs::create_dir_all(&snapshots)?;

        tracing::info!(binary = %binary.display(), port = self.cfg.port, "spawning sidecar");

        let child = tokio::process::Command::new(binary)
            .env("QDRANT__SERVICE__HTTP_PORT", self.cfg.port.to_string())
            .env("QDRANT__SERVICE__HOST", &self.cfg.host)
            .env("QDRANT__STORAGE__STORAGE_PATH", &storage)
            .env("QDRANT__STORAGE__SNAPSHOTS_PATH", &snapshots)
            .env("QDRANT__TELEMETRY_DISABLED", "true")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngramError::SidecarUnavailable(format!("spawn failed: {e}")))?;

        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn wait_healthy(&self) -> Result<()> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.cfg.startup_timeout_secs);
        loop {
            if self.health_check().await {
                return Ok(());
            }
            // A crashed child will never become healthy; fail fast
            if let Some(child) = self.child.lock().await.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(EngramError::SidecarUnavailable(format!(
                        "process exited during startup: {status}"
                    )));
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngramError::SidecarUnavailable(
                    "health check timed out".into(),
                ));
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/healthz", self.base_url());
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Create the collection (vector size, cosine distance, int8 scalar
    /// quantization) and the payload indexes on `project` and `deleted`,
    /// when they do not exist yet.
    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .http
            .get(self.collection_url())
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);

        if !exists {
            let request = CreateCollectionRequest {
                vectors: VectorParams {
                    size: EMBEDDING_DIM,
                    distance: Distance::Cosine,
                },
                quantization_config: QuantizationConfig {
                    scalar: ScalarQuantization::int8(),
                },
            };
            let response = self
                .http
                .put(self.collection_url())
                .json(&request)
                .send()
                .await
                .map_err(|e| EngramError::SidecarUnavailable(format!("create collection: {e}")))?;
            if !response.status().is_success() {
                return Err(EngramError::SidecarUnavailable(format!(
                    "create collection returned HTTP {}",
                    response.status()
                )));
            }
            tracing::info!(collection = %self.cfg.collection, "collection created");
        }

        for (field, schema) in [
            ("project", FieldSchema::Keyword),
            ("deleted", FieldSchema::Bool),
        ] {
            let request = CreateFieldIndexRequest {
                field_name: field.into(),
                field_schema: schema,
            };
            // Index creation is idempotent server-side; ignore conflicts
            let _ = self
                .http
                .put(format!("{}/index", self.collection_url()))
                .json(&request)
                .send()
                .await
                .map_err(|e| EngramError::SidecarUnavailable(format!("create index: {e}")))?;
        }
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            SidecarState::Ready => Ok(()),
            state => Err(EngramError::VectorBackendUnavailable(format!(
                "sidecar not ready (state: {state:?})"
            ))),
        }
    }

    fn build_filter(filter: &VectorFilter) -> Option<Filter> {
        let mut must = Vec::new();
        let mut must_not = Vec::new();

        if let Some(ref project) = filter.project {
            must.push(Condition::Field {
                key: "project".into(),
                matches: MatchValue::Any {
                    any: vec![project.clone(), GLOBAL_PROJECT.to_string()],
                },
            });
        }
        if filter.exclude_deleted {
            must_not.push(Condition::Field {
                key: "deleted".into(),
                matches: MatchValue::Value {
                    value: serde_json::json!(true),
                },
            });
        }
        if !filter.exclude_ids.is_empty() {
            must_not.push(Condition::HasId {
                has_id: filter.exclude_ids.clone(),
            });
        }

        if must.is_empty() && must_not.is_empty() {
            None
        } else {
            Some(Filter { must, must_not })
        }
    }
}

#[async_trait]
impl VectorStore for SidecarVectorStore {
    fn is_ready(&self) -> bool {
        self.state() == SidecarState::Ready
    }

    async fn upsert(&self, id: &str, embedding: &[f32], metadata: &PointMetadata) -> Result<()> {
        let items = [UpsertItem {
            id: id.to_string(),
            embedding: embedding.to_vec(),
            metadata: metadata.clone(),
        }];
        self.upsert_batch(&items).await.map(|_| ())
    }

    async fn upsert_batch(&self, items: &[UpsertItem]) -> Result<usize> {
        self.ensure_ready()?;
        if items.is_empty() {
            return Ok(0);
        }
        for item in items {
            if item.embedding.len() != EMBEDDING_DIM {
                return Err(EngramError::InvalidEmbeddingDimension {
                    expected: EMBEDDING_DIM,
                    got: item.embedding.len(),
                });
            }
        }

        let request = UpsertPointsRequest {
            points: items
                .iter()
                .map(|item| PointStruct {
                    id: item.id.clone(),
                    vector: item.embedding.clone(),
                    payload: PointPayload {
                        project: item.metadata.project.clone(),
                        deleted: item.metadata.deleted,
                    },
                })
                .collect(),
        };

        let response = self
            .http
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&request)
            .send()
            .await
            .map_err(|e| EngramError::VectorBackendUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EngramError::VectorBackendUnavailable(format!(
                "upsert returned HTTP {}",
                response.status()
            )));
        }
        let _: AckResponse = response
            .json()
            .await
            .map_err(|e| EngramError::VectorBackendUnavailable(e.to_string()))?;
        Ok(items.len())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<ScoredPoint>> {
        self.ensure_ready()?;
        if query.len() != EMBEDDING_DIM {
            return Err(EngramError::InvalidEmbeddingDimension {
                expected: EMBEDDING_DIM,
                got: query.len(),
            });
        }

        let request = SearchPointsRequest {
            vector: query.to_vec(),
            limit,
            score_threshold: Some(NOISE_FLOOR),
            filter: Self::build_filter(filter),
            with_payload: false,
        };

        let response = self
            .http
            .post(format!("{}/points/search", self.collection_url()))
            .json(&request)
            .send()
            .await
            .map_err(|e| EngramError::VectorBackendUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EngramError::VectorBackendUnavailable(format!(
                "search returned HTTP {}",
                response.status()
            )));
        }
        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| EngramError::VectorBackendUnavailable(e.to_string()))?;

        let points: Vec<ScoredPoint> = body
            .result
            .into_iter()
            .map(|wire| ScoredPoint {
                id: wire.id_string(),
                score: wire.score.clamp(0.0, 1.0),
            })
            .collect();

        Ok(finalize_results(points, limit, filter.min_score))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.ensure_ready()?;
        let request = DeletePointsRequest {
            points: vec![id.to_string()],
        };
        let response = self
            .http
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&request)
            .send()
            .await
            .map_err(|e| EngramError::VectorBackendUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EngramError::VectorBackendUnavailable(format!(
                "delete returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        self.ensure_ready()?;
        let response = self
            .http
            .get(self.collection_url())
            .send()
            .await
            .map_err(|e| EngramError::VectorBackendUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EngramError::VectorBackendUnavailable(format!(
                "collection info returned HTTP {}",
                response.status()
            )));
        }
        let info: CollectionInfoResponse = response
            .json()
            .await
            .map_err(|e| EngramError::VectorBackendUnavailable(e.to_string()))?;
        Ok(info.result.points_count.unwrap_or(0) as usize)
    }

    /// Terminate the child process. Runs even when the HTTP client has
    /// already failed — the process must not outlive the store.
    async fn close(&self) -> Result<()> {
        self.set_state(SidecarState::Closed);
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "failed to kill sidecar process");
            } else {
                tracing::info!("sidecar process terminated");
            }
        }
        Ok(())
    }
}

/// Look for an executable on PATH.
fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg(port: u16) -> SidecarConfig {
        SidecarConfig {
            binary_path: Some("/nonexistent/qdrant".into()),
            host: "127.0.0.1".into(),
            port,
            collection: "test".into(),
            storage_dir: "/tmp/engram-test/storage".into(),
            snapshot_dir: "/tmp/engram-test/snapshots".into(),
            startup_timeout_secs: 1,
            connect_timeout_secs: 1,
            request_timeout_secs: 1,
            download_url: "http://127.0.0.1:1/none".into(),
        }
    }

    #[test]
    fn new_store_is_not_started() {
        let store = SidecarVectorStore::new(test_cfg(59999)).unwrap();
        assert_eq!(store.state(), SidecarState::NotStarted);
        assert!(!store.is_ready());
    }

    #[tokio::test]
    async fn failed_start_moves_to_failed_state() {
        let store = SidecarVectorStore::new(test_cfg(59998)).unwrap();
        // No instance on the port and the configured binary does not exist
        let result = store.start().await;
        assert!(result.is_err());
        assert_eq!(store.state(), SidecarState::Failed);
        assert!(!store.is_ready());
    }

    #[tokio::test]
    async fn operations_refuse_when_not_ready() {
        let store = SidecarVectorStore::new(test_cfg(59997)).unwrap();
        let result = store
            .search(&vec![0.0; EMBEDDING_DIM], 5, &VectorFilter::default())
            .await;
        assert!(matches!(
            result,
            Err(EngramError::VectorBackendUnavailable(_))
        ));
        assert!(store.count().await.is_err());
        assert!(store.delete("x").await.is_err());
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let store = SidecarVectorStore::new(test_cfg(59996)).unwrap();
        store.close().await.unwrap();
        assert_eq!(store.state(), SidecarState::Closed);
        let result = store.start().await;
        assert!(matches!(result, Err(EngramError::SidecarUnavailable(_))));
    }

    #[test]
    fn filter_builds_scope_and_tombstone_clauses() {
        let filter = VectorFilter {
            project: Some("alpha".into()),
            exclude_deleted: true,
            exclude_ids: vec!["m1".into()],
            min_score: None,
        };
        let wire = SidecarVectorStore::build_filter(&filter).unwrap();
        assert_eq!(wire.must.len(), 1);
        assert_eq!(wire.must_not.len(), 2);

        let empty = SidecarVectorStore::build_filter(&VectorFilter::default());
        assert!(empty.is_none());
    }
}
