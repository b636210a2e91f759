use anyhow::Result;

use crate::config::EngramConfig;
use crate::memory::store::MemoryStore;

/// Run a hybrid search from the terminal.
pub async fn search(
    config: &EngramConfig,
    query: &str,
    project: &str,
    limit: usize,
    min_confidence: f64,
) -> Result<()> {
    let store = MemoryStore::open(config.clone()).await?;
    let hits = store.search(query, project, limit, min_confidence).await?;
    store.close().await?;

    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "  {}. [{}] {} (score: {:.3}, confidence: {:.2} {:?}, retention: {:?})",
            i + 1,
            hit.memory_type,
            hit.id,
            hit.score,
            hit.effective_confidence,
            hit.confidence_level,
            hit.retention_level,
        );
        if let Some(ref snippet) = hit.snippet {
            println!("     {snippet}");
        }
        if let Some(caution) = hit.caution {
            println!("     note: {caution}");
        }
        println!();
    }

    Ok(())
}
