//! SQLite-backed content store.

use super::models::*;
use super::schema::CONTENT_VERSIONED_SCHEMAS;
use super::trait_def::ContentStore;
use crate::sqlite_persistence::open_with_schemas;
use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// SQLite-backed content repository.
///
/// Stores content items and their key/value metadata in `content.db`.
pub struct SqliteContentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteContentStore {
    /// Open (or create) the content database at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open content database {:?}", db_path.as_ref()))?;
        // The daemon and CLI commands share this file.
        conn.busy_timeout(Duration::from_secs(5))?;
        open_with_schemas(&conn, CONTENT_VERSIONED_SCHEMAS, "content")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store, used by tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        open_with_schemas(&conn, CONTENT_VERSIONED_SCHEMAS, "content")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<ContentItem> {
        Ok(ContentItem {
            id: row.get("id")?,
            content_type: row.get("content_type")?,
            status: ContentStatus::from_str(&row.get::<_, String>("status")?)
                .unwrap_or(ContentStatus::Draft),
            title: row.get("title")?,
            body: row.get("body")?,
            modified_at: row.get("modified_at")?,
        })
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl ContentStore for SqliteContentStore {
    fn get_item(&self, id: ItemId) -> Result<Option<ContentItem>> {
        let conn = self.conn.lock().unwrap();
        let item = conn
            .query_row(
                "SELECT * FROM content_items WHERE id = ?1",
                [id],
                Self::row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    fn set_body(&self, id: ItemId, body: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE content_items SET body = ?1, modified_at = ?2 WHERE id = ?3",
            params![body, Self::now(), id],
        )?;
        Ok(updated > 0)
    }

    fn insert_item(&self, item: NewContentItem) -> Result<ItemId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO content_items (content_type, status, title, body, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                item.content_type,
                item.status.as_str(),
                item.title,
                item.body,
                Self::now()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn find_items(&self, filter: &ContentFilter) -> Result<Vec<ContentItem>> {
        let conn = self.conn.lock().unwrap();

        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<String> = Vec::new();
        if !filter.content_types.is_empty() {
            let placeholders = (0..filter.content_types.len())
                .map(|i| format!("?{}", values.len() + i + 1))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("content_type IN ({})", placeholders));
            values.extend(filter.content_types.iter().cloned());
        }
        if let Some(status) = filter.status {
            clauses.push(format!("status = ?{}", values.len() + 1));
            values.push(status.as_str().to_string());
        }

        let mut sql = "SELECT * FROM content_items".to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id ASC");

        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn get_meta(&self, id: ItemId, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT meta_value FROM content_meta WHERE item_id = ?1 AND meta_key = ?2",
                params![id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_meta(&self, id: ItemId, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO content_meta (item_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
             ON CONFLICT(item_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
            params![id, key, value],
        )?;
        Ok(())
    }

    fn compare_and_set_meta(
        &self,
        id: ItemId,
        key: &str,
        expected: &str,
        value: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE content_meta SET meta_value = ?4
             WHERE item_id = ?1 AND meta_key = ?2 AND meta_value = ?3",
            params![id, key, expected, value],
        )?;
        Ok(changed == 1)
    }

    fn delete_meta(&self, id: ItemId, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM content_meta WHERE item_id = ?1 AND meta_key = ?2",
            params![id, key],
        )?;
        Ok(())
    }

    fn list_meta(&self, key: &str) -> Result<Vec<(ItemId, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT item_id, meta_value FROM content_meta WHERE meta_key = ?1 ORDER BY item_id ASC",
        )?;
        let pairs = stmt
            .query_map([key], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    fn try_acquire_lease(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool> {
        let now = Self::now();
        let expires_at = now + ttl.as_secs() as i64;
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "INSERT INTO processing_leases (name, owner, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET owner = excluded.owner, expires_at = excluded.expires_at
                 WHERE processing_leases.owner = excluded.owner OR processing_leases.expires_at <= ?4",
                params![name, owner, expires_at, now],
            )
            .with_context(|| format!("Failed to acquire lease {}", name))?;
        Ok(changed == 1)
    }

    fn release_lease(&self, name: &str, owner: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM processing_leases WHERE name = ?1 AND owner = ?2",
            params![name, owner],
        )?;
        Ok(())
    }
}
