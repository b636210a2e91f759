pub mod cache;
pub mod confidence;
pub mod contradiction;
pub mod edges;
pub mod maintenance;
pub mod retention;
pub mod search;
pub mod stats;
pub mod store;
pub mod types;

use rusqlite::{params, Connection};

use crate::error::Result;

/// Current UTC timestamp in RFC 3339.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Fractional days from `earlier` to `later`, clamped at zero. Unparseable
/// timestamps count as "just now".
pub(crate) fn days_between(earlier: &str, later: &str) -> f64 {
    match (
        chrono::DateTime::parse_from_rfc3339(earlier),
        chrono::DateTime::parse_from_rfc3339(later),
    ) {
        (Ok(e), Ok(l)) => ((l - e).num_seconds() as f64 / 86400.0).max(0.0),
        _ => 0.0,
    }
}

/// Write an entry to the memory_log audit table.
pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    memory_id: &str,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    let now = now_rfc3339();
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO memory_log (operation, memory_id, details, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![operation, memory_id, details_json, now],
    )?;
    Ok(())
}
