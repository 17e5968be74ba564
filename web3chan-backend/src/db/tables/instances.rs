//! Instance database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use super::super::sqlite::parse_timestamp;
use super::super::Database;
use crate::models::Instance;

fn row_to_instance(row: &Row) -> SqliteResult<Instance> {
    let created_at_str: String = row.get(4)?;
    Ok(Instance {
        id: row.get(0)?,
        base_url: row.get(1)?,
        client_id: row.get(2)?,
        client_secret: row.get(3)?,
        created_at: parse_timestamp(4, &created_at_str)?,
    })
}

impl Database {
    /// Get an instance by its base URL
    pub fn get_instance_by_url(&self, base_url: &str) -> SqliteResult<Option<Instance>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, base_url, client_id, client_secret, created_at FROM instances WHERE base_url = ?1",
            [base_url],
            row_to_instance,
        )
        .optional()
    }

    /// Insert a new instance with freshly registered app credentials
    pub fn create_instance(
        &self,
        base_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> SqliteResult<Instance> {
        let conn = self.conn.lock();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO instances (base_url, client_id, client_secret, created_at) VALUES (?1, ?2, ?3, ?4)",
            [base_url, client_id, client_secret, now.to_rfc3339().as_str()],
        )?;

        Ok(Instance {
            id: conn.last_insert_rowid(),
            base_url: base_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            created_at: now,
        })
    }
}
