use std::collections::BTreeSet;

use anyhow::{Context, Result};
use rusqlite::Connection;

struct Migration {
    version: &'static str,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001",
        name: "stage_completions",
        sql: include_str!("migrations/001_initial.sql"),
    },
    Migration {
        version: "002",
        name: "completion_order",
        sql: include_str!("migrations/002_completion_order.sql"),
    },
];

/// Bring the save file up to the latest schema. Returns how many migrations ran.
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .context("Failed to create schema_migrations table")?;

    let applied = applied_versions(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(m.version))
        .collect();

    for migration in &pending {
        apply(conn, migration)?;
    }
    Ok(pending.len())
}

/// Latest applied version, `None` for a save file that was never migrated.
pub fn current_version(conn: &Connection) -> Result<Option<String>> {
    Ok(applied_versions(conn)?.into_iter().next_back())
}

fn applied_versions(conn: &Connection) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<BTreeSet<String>, _>>()?;
    Ok(versions)
}

/// The migration and its bookkeeping row commit together.
fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    tracing::info!(
        "Applying save file migration {} ({})",
        migration.version,
        migration.name
    );

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql).with_context(|| {
        format!(
            "Failed to apply migration {} ({})",
            migration.version, migration.name
        )
    })?;
    tx.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
        (migration.version, migration.name, chrono::Utc::now().to_rfc3339()),
    )?;
    tx.commit()?;
    Ok(())
}
