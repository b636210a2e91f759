#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use engram::config::EngramConfig;
use engram::db;
use engram::embedding::{EmbeddingProvider, EMBEDDING_DIM};
use engram::memory::store::{MemoryStore, StoreRequest};
use engram::memory::types::MemoryType;
use engram::vector::embedded::EmbeddedVectorStore;
use rusqlite::Connection;

/// A memory store over an in-memory database, plus a connection handle for
/// direct SQL assertions.
pub struct TestHarness {
    pub store: MemoryStore,
    pub conn: Arc<Mutex<Connection>>,
}

/// Build a store with the deterministic bag-of-words embedder.
pub fn harness() -> TestHarness {
    harness_with(Some(Arc::new(BowEmbedder)))
}

/// Build a store without an embedder (lexical-only mode).
pub fn lexical_harness() -> TestHarness {
    harness_with(None)
}

fn harness_with(embedder: Option<Arc<dyn EmbeddingProvider>>) -> TestHarness {
    let conn = Arc::new(Mutex::new(db::open_memory_database().unwrap()));
    let vectors = Arc::new(EmbeddedVectorStore::new(Arc::clone(&conn)));
    let store = MemoryStore::new(
        Arc::clone(&conn),
        embedder,
        vectors,
        None,
        EngramConfig::default(),
    );
    TestHarness { store, conn }
}

/// Deterministic bag-of-words embedder: hashed word counts, L2-normalized.
/// Sentences sharing words get high cosine similarity.
pub struct BowEmbedder;

impl EmbeddingProvider for BowEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(bow_embedding(text))
    }
}

pub fn bow_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '.')
        .filter(|w| !w.is_empty())
    {
        let mut h: usize = 5381;
        for b in word.bytes() {
            h = h.wrapping_mul(33).wrapping_add(b as usize);
        }
        v[h % EMBEDDING_DIM] += 1.0;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

/// Deterministic spike embedding: unit vector along `seed`.
pub fn spike_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[seed % EMBEDDING_DIM] = 1.0;
    v
}

/// A plain fact store request in the global scope.
pub fn request(content: &str) -> StoreRequest {
    request_in(content, "global")
}

pub fn request_in(content: &str, project: &str) -> StoreRequest {
    StoreRequest {
        content: content.into(),
        memory_type: MemoryType::Fact,
        tags: vec![],
        importance: None,
        confidence: None,
        project: project.into(),
    }
}
