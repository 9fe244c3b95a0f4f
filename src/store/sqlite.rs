use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use super::{merge, require_object, Document, DocumentStore, WriteOp};
use crate::error::{LedgerError, Result};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (collection, id)
);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Documents stored as JSON text in a single SQLite table.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %db_path.display(), "opened document store");
        Ok(Self { conn })
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    /// Document count per collection, alphabetical.
    pub fn counts(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT collection, count(*) FROM documents GROUP BY collection ORDER BY collection",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Copy the live database to `dest` using SQLite's online backup.
    pub fn backup_to(&self, dest: &Path) -> Result<()> {
        let mut dest_conn = Connection::open(dest)?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dest_conn)?;
        backup.run_to_completion(100, std::time::Duration::from_millis(10), None)?;
        info!(dest = %dest.display(), "backup written");
        Ok(())
    }

    fn read(conn: &Connection, collection: &str, id: &str) -> Result<Option<Value>> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                [collection, id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn write(conn: &Connection, collection: &str, id: &str, data: &Value) -> Result<()> {
        require_object(data)?;
        conn.execute(
            "INSERT INTO documents (collection, id, data, updated_at) \
             VALUES (?1, ?2, ?3, datetime('now')) \
             ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            rusqlite::params![collection, id, serde_json::to_string(data)?],
        )?;
        Ok(())
    }

    fn apply(conn: &Connection, op: &WriteOp) -> Result<()> {
        match op {
            WriteOp::Set {
                collection,
                id,
                data,
            } => Self::write(conn, collection, id, data),
            WriteOp::Update {
                collection,
                id,
                patch,
            } => {
                let mut current = Self::read(conn, collection, id)?
                    .ok_or_else(|| LedgerError::not_found(collection, id))?;
                merge(&mut current, patch)?;
                Self::write(conn, collection, id, &current)
            }
            WriteOp::Delete { collection, id } => {
                conn.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                    [collection, id],
                )?;
                Ok(())
            }
        }
    }
}

impl DocumentStore for SqliteStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(Self::read(&self.conn, collection, id)?.map(|data| Document {
            id: id.to_string(),
            data,
        }))
    }

    fn set(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        Self::write(&self.conn, collection, id, &data)
    }

    fn update(&self, collection: &str, id: &str, patch: Value) -> Result<()> {
        Self::apply(&self.conn, &WriteOp::update(collection, id, patch))
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            [collection, id],
        )?;
        Ok(n > 0)
    }

    fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, data FROM documents WHERE collection = ?1 ORDER BY id")?;
        let rows: Vec<(String, String)> = stmt
            .query_map([collection], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, text)| -> Result<Document> {
                Ok(Document {
                    id,
                    data: serde_json::from_str(&text)?,
                })
            })
            .collect()
    }

    fn commit(&self, ops: Vec<WriteOp>) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for op in &ops {
            Self::apply(&tx, op)?;
        }
        tx.commit()?;
        debug!(ops = ops.len(), "batch committed");
        Ok(())
    }
}
