use anyhow::Result;

use crate::config::EngramConfig;
use crate::memory::store::MemoryStore;

/// Retention-based archive sweep. Dry run by default; `apply` tombstones.
pub async fn sweep(config: &EngramConfig, apply: bool) -> Result<()> {
    let store = MemoryStore::open(config.clone()).await?;
    let result = store.archive_sweep(!apply).await?;
    store.close().await?;

    if result.candidates.is_empty() {
        println!("No archive candidates.");
        return Ok(());
    }

    println!(
        "{} candidate(s){}:\n",
        result.candidates.len(),
        if result.dry_run { " (dry run)" } else { "" }
    );
    for candidate in &result.candidates {
        println!(
            "  {} retention {:.3}, importance {:.2}, idle {}d",
            candidate.id, candidate.retention, candidate.importance, candidate.days_inactive,
        );
        println!("     {}", candidate.content_preview);
    }

    if result.dry_run {
        println!("\nRun with --apply to archive these memories.");
    } else {
        println!("\nArchived {} memories.", result.archived);
    }

    Ok(())
}
