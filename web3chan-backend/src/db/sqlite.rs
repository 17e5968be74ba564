//! SQLite database - schema definitions and connection management
//!
//! Table operations live in the tables/ subdirectory as `impl Database` blocks.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;

/// Main database wrapper, a single connection behind a mutex
pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    /// Open the database and create the schema if needed
    pub fn new(database_url: &str) -> SqliteResult<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(database_url)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// In-memory database, used by tests
    #[cfg(test)]
    pub fn in_memory() -> SqliteResult<Self> {
        Self::new(":memory:")
    }

    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn.lock();

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        // Instances: one row per remote server, shared by all boards on it
        conn.execute(
            "CREATE TABLE IF NOT EXISTS instances (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                base_url TEXT UNIQUE NOT NULL,
                client_id TEXT NOT NULL,
                client_secret TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS boards (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                instance_id INTEGER NOT NULL REFERENCES instances(id),
                access_token TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                streaming INTEGER NOT NULL DEFAULT 0,
                autofollow INTEGER NOT NULL DEFAULT 1,
                replies INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Drop every table managed by this crate
    pub fn drop_schema(&self) -> SqliteResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "DROP TABLE IF EXISTS boards;
             DROP TABLE IF EXISTS instances;",
        )
    }
}

/// Parse an RFC 3339 column written by this crate
pub(crate) fn parse_timestamp(idx: usize, value: &str) -> SqliteResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
