mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::Connection;
use uuid::Uuid;

use crate::models::*;

/// SQLite store for stage completion records.
///
/// This is the durable side of progression only: the in-memory
/// [`ProgressionEngine`](crate::progression::ProgressionEngine) stays
/// authoritative for the running session and is rebuilt from these records on
/// startup.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create save directory {}", parent.display()))?;
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open save file {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "closet-quest")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("closet-quest.db"))
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let applied = schema::run_migrations(&conn)?;
        if applied > 0 {
            tracing::debug!("Applied {} migration(s)", applied);
        }
        Ok(())
    }

    /// Latest migration applied to this save file.
    pub fn schema_version(&self) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::current_version(&conn)
    }

    // ============================================================
    // Completion records
    // ============================================================

    pub fn insert_completion(&self, record: &CompletionRecord) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let evidence = serde_json::to_string(&record.evidence)?;

        // A retried write for the same record is a no-op.
        conn.execute(
            "INSERT OR IGNORE INTO stage_completions (id, stage_id, evidence, completed_at)
             VALUES (?, ?, ?, ?)",
            (
                record.id.to_string(),
                record.stage_id,
                &evidence,
                record.completed_at.to_rfc3339(),
            ),
        )?;

        Ok(())
    }

    /// All records, oldest first.
    pub fn get_completions(&self) -> Result<Vec<CompletionRecord>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, stage_id, evidence, completed_at
             FROM stage_completions ORDER BY completed_at, stage_id",
        )?;

        let records = stmt
            .query_map([], row_to_completion)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Forget all progress. Returns how many records were removed.
    pub fn clear_completions(&self) -> Result<usize> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM stage_completions", [])?;
        tracing::info!("Cleared {} completion record(s) at {}", rows, Utc::now());
        Ok(rows)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn row_to_completion(row: &rusqlite::Row<'_>) -> rusqlite::Result<CompletionRecord> {
    let evidence_json: String = row.get(2)?;
    let evidence: Evidence = serde_json::from_str(&evidence_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(CompletionRecord {
        id: parse_uuid(row.get::<_, String>(0)?),
        stage_id: row.get(1)?,
        evidence,
        completed_at: parse_datetime(row.get::<_, String>(3)?),
    })
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
