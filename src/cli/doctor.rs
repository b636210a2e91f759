//! CLI `doctor` command — run database diagnostics and print a health report.

use anyhow::{Context, Result};

use crate::config::EngramConfig;
use crate::db;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &EngramConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run any command that writes a memory to initialize it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path)
        .context("failed to open database (may be corrupt)")?;

    let schema_version = db::migrations::get_schema_version(&conn)?;
    let vec_version: String = conn
        .query_row("SELECT vec_version()", [], |r| r.get(0))
        .unwrap_or_else(|_| "(unavailable)".into());
    let embedding_model = db::migrations::get_embedding_model(&conn)?;
    let integrity: String = conn
        .query_row("PRAGMA integrity_check", [], |r| r.get(0))
        .unwrap_or_else(|_| "failed".into());

    let stats = crate::memory::stats::memory_stats(&conn, None, Some(&db_path))?;

    println!("Engram Health Report");
    println!("====================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {schema_version}");
    println!("sqlite-vec:        v{vec_version}");
    println!("Vector backend:    {}", config.vector.backend);
    println!();
    println!("Embedding model:");
    println!(
        "  Stored:          {}",
        embedding_model.as_deref().unwrap_or("(not set)")
    );
    println!("  Configured:      {}", config.embedding.model);
    if let Some(ref stored) = embedding_model {
        if stored != &config.embedding.model {
            println!("  WARNING: model mismatch! Stored vectors may not be comparable.");
        } else {
            println!("  Status:          OK (match)");
        }
    }
    println!();
    println!("Row counts:");
    println!("  Memories:        {}", stats.total_memories);
    println!("  Active:          {}", stats.active_memories);
    println!("  With embedding:  {}", stats.with_embedding);
    println!("  Active edges:    {}", stats.active_edges);
    println!();
    if integrity == "ok" {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({integrity})");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
