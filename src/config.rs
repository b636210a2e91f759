use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngramConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub nli: NliConfig,
    pub vector: VectorConfig,
    pub retrieval: RetrievalConfig,
    pub detector: DetectorConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Hard ceiling on memory content length, in bytes.
    pub max_content_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NliConfig {
    pub enabled: bool,
    pub model: String,
    pub cache_dir: String,
}

/// Vector backend selection and sidecar process settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorConfig {
    /// `"embedded"` (SQLite-resident) or `"sidecar"` (child process).
    pub backend: String,
    pub sidecar: SidecarConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SidecarConfig {
    /// Explicit binary path override. Checked first during resolution.
    pub binary_path: Option<String>,
    pub host: String,
    pub port: u16,
    pub collection: String,
    pub storage_dir: String,
    pub snapshot_dir: String,
    /// Seconds to poll the health endpoint before giving up on a spawn.
    pub startup_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub download_url: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_max_results: usize,
    pub rrf_k: usize,
    pub lexical_weight: f64,
    pub semantic_weight: f64,
    /// Normalized fused scores below this are dropped.
    pub min_score: f64,
    pub snippet_chars: usize,
    pub cache_ttl_secs: u64,
}

/// Empirically tuned thresholds for the contradiction pipeline. Values carry
/// over from production tuning; change with care.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DetectorConfig {
    pub min_word_overlap: f64,
    pub min_similarity: f64,
    pub negation_overlap: f64,
    pub negation_similarity: f64,
    pub negation_sim_weight: f64,
    pub negation_confidence_cap: f64,
    pub antonym_confidence: f64,
    pub factual_confidence: f64,
    pub semantic_similarity: f64,
    pub semantic_max_overlap: f64,
    pub semantic_confidence: f64,
    pub nli_min_similarity: f64,
    pub nli_min_confidence: f64,
    pub passive_candidate_window: usize,
    pub proactive_candidate_window: usize,
    pub passive_max_results: usize,
    pub proactive_max_results: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetentionConfig {
    pub decay_lambda: f64,
    pub min_strength: f64,
    pub max_strength: f64,
    pub max_boost: f64,
    pub boost_base: f64,
    pub boost_diminishing: f64,
    pub archive_importance_ceiling: f64,
    pub archive_retention_floor: f64,
    pub archive_strength_floor: f64,
    pub archive_inactive_days: i64,
    pub archive_min_corpus: usize,
}

impl Default for EngramConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            nli: NliConfig::default(),
            vector: VectorConfig::default(),
            retrieval: RetrievalConfig::default(),
            detector: DetectorConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_engram_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            max_content_bytes: 8 * 1024,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_engram_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
        }
    }
}

impl Default for NliConfig {
    fn default() -> Self {
        let cache_dir = default_engram_dir()
            .join("models/nli")
            .to_string_lossy()
            .into_owned();
        Self {
            enabled: false,
            model: "nli-MiniLM2-L6".into(),
            cache_dir,
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: "embedded".into(),
            sidecar: SidecarConfig::default(),
        }
    }
}

impl Default for SidecarConfig {
    fn default() -> Self {
        let base = default_engram_dir();
        Self {
            binary_path: None,
            host: "127.0.0.1".into(),
            port: 6334,
            collection: "engram".into(),
            storage_dir: base.join("sidecar/storage").to_string_lossy().into_owned(),
            snapshot_dir: base.join("sidecar/snapshots").to_string_lossy().into_owned(),
            startup_timeout_secs: 30,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            download_url: "https://github.com/qdrant/qdrant/releases/latest/download".into(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_max_results: 10,
            rrf_k: 60,
            lexical_weight: 0.5,
            semantic_weight: 0.5,
            min_score: 0.05,
            snippet_chars: 160,
            cache_ttl_secs: 60,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_word_overlap: 0.2,
            min_similarity: 0.5,
            negation_overlap: 0.4,
            negation_similarity: 0.75,
            negation_sim_weight: 0.3,
            negation_confidence_cap: 0.9,
            antonym_confidence: 0.75,
            factual_confidence: 0.85,
            semantic_similarity: 0.85,
            semantic_max_overlap: 0.3,
            semantic_confidence: 0.55,
            nli_min_similarity: 0.8,
            nli_min_confidence: 0.7,
            passive_candidate_window: 100,
            proactive_candidate_window: 500,
            passive_max_results: 5,
            proactive_max_results: 20,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            decay_lambda: 0.35,
            min_strength: 0.1,
            max_strength: 10.0,
            max_boost: 1.5,
            boost_base: 1.0,
            boost_diminishing: 0.2,
            archive_importance_ceiling: 0.5,
            archive_retention_floor: 0.15,
            archive_strength_floor: 1.0,
            archive_inactive_days: 14,
            archive_min_corpus: 50,
        }
    }
}

/// Returns `~/.engram/`
pub fn default_engram_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".engram")
}

/// Returns the default config file path: `~/.engram/config.toml`
pub fn default_config_path() -> PathBuf {
    default_engram_dir().join("config.toml")
}

impl EngramConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            EngramConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (ENGRAM_DB, ENGRAM_LOG_LEVEL,
    /// ENGRAM_VECTOR_BACKEND).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ENGRAM_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_VECTOR_BACKEND") {
            self.vector.backend = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
