//! Board database operations

use chrono::Utc;
use rusqlite::{OptionalExtension, Result as SqliteResult, Row};

use super::super::sqlite::parse_timestamp;
use super::super::Database;
use crate::models::{Board, BoardOption, Instance, NewBoard};

const BOARD_COLUMNS: &str = "b.id, b.name, b.access_token, b.enabled, b.streaming, b.autofollow, b.replies, \
     b.created_at, b.updated_at, i.id, i.base_url, i.client_id, i.client_secret, i.created_at";

fn row_to_board(row: &Row) -> SqliteResult<Board> {
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;
    let instance_created_at_str: String = row.get(13)?;

    Ok(Board {
        id: row.get(0)?,
        name: row.get(1)?,
        access_token: row.get(2)?,
        enabled: row.get::<_, i64>(3)? != 0,
        streaming: row.get::<_, i64>(4)? != 0,
        autofollow: row.get::<_, i64>(5)? != 0,
        replies: row.get::<_, i64>(6)? != 0,
        created_at: parse_timestamp(7, &created_at_str)?,
        updated_at: parse_timestamp(8, &updated_at_str)?,
        instance: Instance {
            id: row.get(9)?,
            base_url: row.get(10)?,
            client_id: row.get(11)?,
            client_secret: row.get(12)?,
            created_at: parse_timestamp(13, &instance_created_at_str)?,
        },
    })
}

impl Database {
    /// Get a board (with its instance) by name
    pub fn get_board(&self, name: &str) -> SqliteResult<Option<Board>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM boards b JOIN instances i ON i.id = b.instance_id WHERE b.name = ?1",
                BOARD_COLUMNS
            ),
            [name],
            row_to_board,
        )
        .optional()
    }

    /// List all boards ordered by name
    pub fn list_boards(&self) -> SqliteResult<Vec<Board>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM boards b JOIN instances i ON i.id = b.instance_id ORDER BY b.name",
            BOARD_COLUMNS
        ))?;

        let boards = stmt
            .query_map([], row_to_board)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(boards)
    }

    /// List boards that should be started with the daemon
    pub fn list_enabled_boards(&self) -> SqliteResult<Vec<Board>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM boards b JOIN instances i ON i.id = b.instance_id WHERE b.enabled = 1 ORDER BY b.name",
            BOARD_COLUMNS
        ))?;

        let boards = stmt
            .query_map([], row_to_board)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(boards)
    }

    /// Insert a board row
    pub fn create_board(&self, board: &NewBoard) -> SqliteResult<Board> {
        {
            let conn = self.conn.lock();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO boards (name, instance_id, access_token, enabled, streaming, autofollow, replies, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    board.name,
                    board.instance_id,
                    board.access_token,
                    board.enabled,
                    board.streaming,
                    board.autofollow,
                    board.replies,
                    &now,
                    &now
                ],
            )?;
        }

        self.get_board(&board.name)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Delete a board by name, returns false if it did not exist
    pub fn delete_board(&self, name: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock();
        let rows_affected = conn.execute("DELETE FROM boards WHERE name = ?1", [name])?;
        Ok(rows_affected > 0)
    }

    /// Flip a boolean option and return its new value, or None if the board does not exist
    pub fn toggle_board_option(&self, name: &str, option: BoardOption) -> SqliteResult<Option<bool>> {
        let conn = self.conn.lock();
        let column = option.column();
        let now = Utc::now().to_rfc3339();

        let rows_affected = conn.execute(
            &format!(
                "UPDATE boards SET {col} = CASE {col} WHEN 0 THEN 1 ELSE 0 END, updated_at = ?1 WHERE name = ?2",
                col = column
            ),
            [now.as_str(), name],
        )?;

        if rows_affected == 0 {
            return Ok(None);
        }

        let value: i64 = conn.query_row(
            &format!("SELECT {} FROM boards WHERE name = ?1", column),
            [name],
            |row| row.get(0),
        )?;

        Ok(Some(value != 0))
    }
}
