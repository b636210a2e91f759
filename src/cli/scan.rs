use anyhow::Result;

use crate::config::EngramConfig;
use crate::memory::store::MemoryStore;

/// Proactive contradiction check: scan the corpus for conflicts with the
/// given content without storing anything.
pub async fn scan(config: &EngramConfig, content: &str, project: &str) -> Result<()> {
    let store = MemoryStore::open(config.clone()).await?;
    let outcome = store.proactive_check(content, project).await?;
    store.close().await?;

    println!(
        "Scanned {} candidate(s), {} filtered early, {} checked via NLI",
        outcome.stats.candidates_considered,
        outcome.stats.prefiltered_out,
        outcome.stats.nli_checked,
    );

    if outcome.conflicts.is_empty() {
        println!("No conflicts detected.");
        return Ok(());
    }

    println!("\n{} conflict(s):\n", outcome.conflicts.len());
    for conflict in &outcome.conflicts {
        println!(
            "  {} [{}] confidence {:.2} (overlap {:.2}{})",
            conflict.id,
            conflict.kind,
            conflict.confidence,
            conflict.overlap,
            conflict
                .similarity
                .map(|s| format!(", similarity {s:.2}"))
                .unwrap_or_default(),
        );
    }

    Ok(())
}
