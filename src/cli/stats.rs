use anyhow::Result;

use crate::config::EngramConfig;
use crate::memory::types::MemoryType;

/// Display memory statistics in the terminal.
pub fn stats(config: &EngramConfig, project: Option<&str>) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let response = crate::memory::stats::memory_stats(&conn, project, Some(&db_path))?;

    println!("Memory Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total memories:      {}", response.total_memories);
    println!("  Active:              {}", response.active_memories);
    println!("  Tombstoned:          {}", response.tombstoned_memories);
    println!();

    println!("By Type:");
    for t in MemoryType::ALL {
        let count = response.by_type.get(t.as_str()).copied().unwrap_or(0);
        println!("  {:<12} {}", t.as_str(), count);
    }
    println!();

    println!("By Project:");
    let mut projects: Vec<_> = response.by_project.iter().collect();
    projects.sort();
    for (project, count) in projects {
        println!("  {project:<12} {count}");
    }
    println!();

    println!("Active edges:          {}", response.active_edges);
    println!("With embedding:        {}", response.with_embedding);
    println!("Database size:         {} bytes", response.db_size_bytes);

    if let Some(ref oldest) = response.oldest_memory {
        println!("Oldest memory:         {oldest}");
    }
    if let Some(ref newest) = response.newest_memory {
        println!("Newest memory:         {newest}");
    }

    Ok(())
}
