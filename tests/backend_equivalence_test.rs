//! Backend substitutability: both vector backends must rank the same corpus
//! the same way within score tolerance. The sidecar variant needs a local
//! Qdrant binary, so it is ignored by default (run with `-- --ignored`).

mod helpers;

use std::sync::{Arc, Mutex};

use engram::config::SidecarConfig;
use engram::db;
use engram::vector::embedded::EmbeddedVectorStore;
use engram::vector::sidecar::SidecarVectorStore;
use engram::vector::{PointMetadata, UpsertItem, VectorFilter, VectorStore};
use helpers::bow_embedding;

const SCORE_TOLERANCE: f64 = 0.05;

fn corpus() -> Vec<UpsertItem> {
    // Deterministic pseudo-sentences: overlapping word pools yield a spread
    // of similarities instead of orthogonal one-hot vectors.
    let topics = ["deploy", "cache", "index", "queue", "worker", "shard"];
    let verbs = ["uses", "needs", "emits", "stores"];
    let objects = ["tokens", "pages", "events", "metrics", "batches"];

    let mut items = Vec::new();
    for (i, topic) in topics.iter().enumerate() {
        for (j, verb) in verbs.iter().enumerate() {
            for (k, object) in objects.iter().enumerate() {
                let id = format!("m-{i}{j}{k}");
                let text = format!("the {topic} service {verb} {object}");
                items.push(UpsertItem {
                    id,
                    embedding: bow_embedding(&text),
                    metadata: PointMetadata {
                        project: "global".into(),
                        deleted: false,
                    },
                });
            }
        }
    }
    items
}

fn embedded_store() -> EmbeddedVectorStore {
    let conn = Arc::new(Mutex::new(db::open_memory_database().unwrap()));
    EmbeddedVectorStore::new(conn)
}

#[tokio::test]
async fn embedded_scores_are_bounded_and_sorted() {
    let store = embedded_store();
    store.upsert_batch(&corpus()).await.unwrap();

    let query = bow_embedding("the cache service uses tokens");
    let results = store
        .search(&query, 10, &VectorFilter::default())
        .await
        .unwrap();

    assert!(!results.is_empty());
    for window in results.windows(2) {
        assert!(window[0].score >= window[1].score, "descending order");
    }
    for point in &results {
        assert!(point.score > 0.1 && point.score <= 1.0);
    }
    // The exact sentence is the top hit
    assert_eq!(results[0].id, "m-100");
}

#[tokio::test]
async fn embedded_ann_and_full_scan_rank_equivalently() {
    let store = embedded_store();
    store.upsert_batch(&corpus()).await.unwrap();

    let query = bow_embedding("the worker service emits metrics");
    let via_ann = store
        .search(&query, 5, &VectorFilter::default())
        .await
        .unwrap();

    // Same corpus with the ANN index emptied: zero candidates force the
    // full-scan fallback path.
    let conn = Arc::new(Mutex::new(db::open_memory_database().unwrap()));
    let scan_store = EmbeddedVectorStore::new(Arc::clone(&conn));
    scan_store.upsert_batch(&corpus()).await.unwrap();
    conn.lock()
        .unwrap()
        .execute("DELETE FROM vectors_ann", [])
        .unwrap();
    let via_scan = scan_store
        .search(&query, 5, &VectorFilter::default())
        .await
        .unwrap();

    assert_eq!(via_ann.len(), via_scan.len());
    for (a, b) in via_ann.iter().zip(via_scan.iter()) {
        assert_eq!(a.id, b.id);
        assert!((a.score - b.score).abs() < SCORE_TOLERANCE);
    }
}

#[tokio::test]
#[ignore] // Requires a local qdrant binary — run with: cargo test -- --ignored
async fn embedded_and_sidecar_agree_on_top_five() {
    let items = corpus();

    let embedded = embedded_store();
    embedded.upsert_batch(&items).await.unwrap();

    let sidecar = SidecarVectorStore::new(SidecarConfig {
        collection: "engram-equivalence-test".into(),
        ..SidecarConfig::default()
    })
    .unwrap();
    sidecar.start().await.unwrap();
    sidecar.upsert_batch(&items).await.unwrap();

    let query = bow_embedding("the shard service stores batches");
    let filter = VectorFilter {
        exclude_deleted: true,
        ..Default::default()
    };

    let from_embedded = embedded.search(&query, 5, &filter).await.unwrap();
    let from_sidecar = sidecar.search(&query, 5, &filter).await.unwrap();

    assert_eq!(from_embedded.len(), from_sidecar.len());
    for (e, s) in from_embedded.iter().zip(from_sidecar.iter()) {
        assert_eq!(e.id, s.id, "both backends return the same top-5 ids");
        assert!(
            (e.score - s.score).abs() < SCORE_TOLERANCE,
            "scores agree within tolerance: {} vs {}",
            e.score,
            s.score
        );
    }

    sidecar.close().await.unwrap();
}

#[tokio::test]
async fn both_backends_share_count_semantics() {
    let store = embedded_store();
    let mut items = corpus();
    // Flag some points deleted; count() reports live points only
    for item in items.iter_mut().take(10) {
        item.metadata.deleted = true;
    }
    let total = items.len();
    store.upsert_batch(&items).await.unwrap();

    assert_eq!(store.count().await.unwrap(), total - 10);
}
