//! SQLite-backed key-value backend
//!
//! Maps the backend primitives onto two tables in a single SQLite file
//! (WAL mode). Scalars live in `kv_scalars`; list elements live in
//! `kv_lists`, ordered by a signed position that decreases with every push
//! to the head.

use crate::backend::{resolve_range, BackendError, BackendResult, KvBackend};
use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv_scalars (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL
) WITHOUT ROWID;
CREATE TABLE IF NOT EXISTS kv_lists (
    key TEXT NOT NULL,
    position INTEGER NOT NULL,
    value BLOB NOT NULL,
    PRIMARY KEY (key, position)
) WITHOUT ROWID;
";

fn db_err(context: &str, e: rusqlite::Error) -> BackendError {
    BackendError::Database(format!("{}: {}", context, e))
}

fn has_scalar(conn: &Connection, key: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM kv_scalars WHERE key=?1", params![key], |_| Ok(()))
        .optional()
        .map(|row| row.is_some())
}

fn has_list(conn: &Connection, key: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM kv_lists WHERE key=?1 LIMIT 1", params![key], |_| Ok(()))
        .optional()
        .map(|row| row.is_some())
}

fn list_positions(conn: &Connection, key: &str) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT position FROM kv_lists WHERE key=?1 ORDER BY position")?;
    let rows = stmt.query_map(params![key], |row| row.get(0))?;
    rows.collect()
}

/// SQLite key-value backend
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open or create a store at `path`
    pub fn open(path: &Path) -> BackendResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| db_err(&format!("Failed to open SQLite database at {:?}", path), e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| db_err("Failed to enable WAL", e))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| db_err("Failed to set synchronous mode", e))?;

        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> BackendResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| db_err("Failed to open in-memory database", e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> BackendResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| db_err("Failed to create schema", e))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> BackendResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BackendError::Unavailable("SQLite connection lock poisoned".to_string()))
    }
}

#[async_trait]
impl KvBackend for SqliteBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<Bytes>> {
        let conn = self.lock()?;

        if has_list(&conn, key).map_err(|e| db_err("Get failed", e))? {
            return Err(BackendError::WrongType { key: key.to_string() });
        }

        conn.query_row(
            "SELECT value FROM kv_scalars WHERE key=?1",
            params![key],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()
        .map(|value| value.map(Bytes::from))
        .map_err(|e| db_err("Get failed", e))
    }

    async fn set(&self, key: &str, value: Bytes) -> BackendResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| db_err("Set failed", e))?;

        tx.execute("DELETE FROM kv_lists WHERE key=?1", params![key])
            .map_err(|e| db_err("Set failed", e))?;
        tx.execute(
            "INSERT INTO kv_scalars (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, &value[..]],
        )
        .map_err(|e| db_err("Set failed", e))?;

        tx.commit().map_err(|e| db_err("Set failed", e))
    }

    async fn list_push_front(&self, key: &str, value: Bytes) -> BackendResult<()> {
        let conn = self.lock()?;

        if has_scalar(&conn, key).map_err(|e| db_err("Push failed", e))? {
            return Err(BackendError::WrongType { key: key.to_string() });
        }

        conn.execute(
            "INSERT INTO kv_lists (key, position, value) \
             SELECT ?1, COALESCE(MIN(position), 0) - 1, ?2 FROM kv_lists WHERE key=?1",
            params![key, &value[..]],
        )
        .map_err(|e| db_err("Push failed", e))?;
        Ok(())
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> BackendResult<()> {
        let mut conn = self.lock()?;

        if has_scalar(&conn, key).map_err(|e| db_err("Trim failed", e))? {
            return Err(BackendError::WrongType { key: key.to_string() });
        }

        let tx = conn.transaction().map_err(|e| db_err("Trim failed", e))?;
        let positions = list_positions(&tx, key).map_err(|e| db_err("Trim failed", e))?;

        match resolve_range(positions.len(), start, stop) {
            Some((first, last)) => {
                tx.execute(
                    "DELETE FROM kv_lists WHERE key=?1 AND (position < ?2 OR position > ?3)",
                    params![key, positions[first], positions[last]],
                )
                .map_err(|e| db_err("Trim failed", e))?;
            }
            None => {
                tx.execute("DELETE FROM kv_lists WHERE key=?1", params![key])
                    .map_err(|e| db_err("Trim failed", e))?;
            }
        }

        tx.commit().map_err(|e| db_err("Trim failed", e))
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> BackendResult<Vec<Bytes>> {
        let conn = self.lock()?;

        if has_scalar(&conn, key).map_err(|e| db_err("Range failed", e))? {
            return Err(BackendError::WrongType { key: key.to_string() });
        }

        let len: i64 = conn
            .query_row("SELECT COUNT(*) FROM kv_lists WHERE key=?1", params![key], |row| row.get(0))
            .map_err(|e| db_err("Range failed", e))?;

        let Some((first, last)) = resolve_range(len as usize, start, stop) else {
            return Ok(Vec::new());
        };

        let mut stmt = conn
            .prepare(
                "SELECT value FROM kv_lists WHERE key=?1 ORDER BY position LIMIT ?2 OFFSET ?3",
            )
            .map_err(|e| db_err("Range failed", e))?;
        let rows = stmt
            .query_map(params![key, (last - first + 1) as i64, first as i64], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .map_err(|e| db_err("Range failed", e))?;

        rows.map(|row| row.map(Bytes::from).map_err(|e| db_err("Range failed", e)))
            .collect()
    }
}
