//! Audit trail of job state transitions.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::warn;

use super::models::{AnalysisJob, JobState};
use crate::content_store::ItemId;
use crate::sqlite_column;
use crate::sqlite_persistence::{open_with_schemas, Column, SqlType, Table, VersionedSchema};

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub item_id: ItemId,
    /// None when the job was created.
    pub from_state: Option<JobState>,
    pub to_state: JobState,
    pub attempt_count: u32,
    pub detail: Option<String>,
    pub created_at: i64,
}

pub trait AnalysisAuditStore: Send + Sync {
    /// Record that `job` moved from `from` to its current state.
    fn record(&self, from: Option<JobState>, job: &AnalysisJob, detail: Option<&str>) -> Result<()>;

    /// Transitions for one item, oldest first.
    fn history(&self, item_id: ItemId) -> Result<Vec<AuditEntry>>;
}

/// Discards every entry.
pub struct NoOpAuditStore;

impl AnalysisAuditStore for NoOpAuditStore {
    fn record(&self, _from: Option<JobState>, _job: &AnalysisJob, _detail: Option<&str>) -> Result<()> {
        Ok(())
    }

    fn history(&self, _item_id: ItemId) -> Result<Vec<AuditEntry>> {
        Ok(vec![])
    }
}

const AUDIT_LOG_TABLE_V0: Table = Table {
    name: "analysis_audit_log",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("item_id", &SqlType::Integer, non_null = true),
        sqlite_column!("from_state", &SqlType::Text),
        sqlite_column!("to_state", &SqlType::Text, non_null = true),
        sqlite_column!("attempt_count", &SqlType::Integer, non_null = true),
        sqlite_column!("detail", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(crate::sqlite_persistence::DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_analysis_audit_item", "item_id")],
    primary_key: None,
};

pub const AUDIT_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[AUDIT_LOG_TABLE_V0],
    migration: None,
}];

pub struct SqliteAuditStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAuditStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open audit database {:?}", db_path.as_ref()))?;
        open_with_schemas(&conn, AUDIT_VERSIONED_SCHEMAS, "audit")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        open_with_schemas(&conn, AUDIT_VERSIONED_SCHEMAS, "audit")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// None for rows whose states this build does not know.
    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<Option<AuditEntry>> {
        let id: i64 = row.get("id")?;
        let from_raw: Option<String> = row.get("from_state")?;
        let to_raw: String = row.get("to_state")?;
        let from_state = match from_raw.as_deref() {
            None => None,
            Some(raw) => match JobState::from_str(raw) {
                Some(state) => Some(state),
                None => {
                    warn!("Skipping audit entry {}: unknown state {:?}", id, raw);
                    return Ok(None);
                }
            },
        };
        let Some(to_state) = JobState::from_str(&to_raw) else {
            warn!("Skipping audit entry {}: unknown state {:?}", id, to_raw);
            return Ok(None);
        };
        Ok(Some(AuditEntry {
            id,
            item_id: row.get("item_id")?,
            from_state,
            to_state,
            attempt_count: row.get("attempt_count")?,
            detail: row.get("detail")?,
            created_at: row.get("created_at")?,
        }))
    }
}

impl AnalysisAuditStore for SqliteAuditStore {
    fn record(&self, from: Option<JobState>, job: &AnalysisJob, detail: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO analysis_audit_log (item_id, from_state, to_state, attempt_count, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                job.item_id,
                from.map(|s| s.as_str()),
                job.state.as_str(),
                job.attempt_count,
                detail,
                job.updated_at,
            ],
        )?;
        Ok(())
    }

    fn history(&self, item_id: ItemId) -> Result<Vec<AuditEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM analysis_audit_log WHERE item_id = ?1 ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map([item_id], Self::row_to_entry)?
            .filter_map(|entry| entry.transpose())
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}
