//! SQLite connection bootstrap.
//!
//! Opens file or in-memory connections with `foreign_keys=ON`, a busy
//! timeout, and the full schema applied before the connection is handed
//! out. In-memory connections back the test suites.

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use crate::error::AppError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS calculations (
    id         INTEGER PRIMARY KEY,
    user_id    INTEGER NOT NULL REFERENCES users(id),
    a          REAL NOT NULL,
    b          REAL NOT NULL,
    op         TEXT NOT NULL,
    result     REAL NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_calculations_user ON calculations(user_id);
";

/// Opens the database file, creating its parent directory if needed, and
/// applies the schema.
pub fn open_db(path: impl AsRef<Path>) -> Result<Connection, AppError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Internal(format!(
                    "failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let conn = Connection::open(path)?;
    bootstrap_connection(&conn)?;
    log::info!("database ready at {}", path.display());
    Ok(conn)
}

/// Opens a fresh in-memory database with the schema applied.
pub fn open_db_in_memory() -> Result<Connection, AppError> {
    let conn = Connection::open_in_memory()?;
    bootstrap_connection(&conn)?;
    Ok(conn)
}

fn bootstrap_connection(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Current time as epoch milliseconds, the storage format for all
/// `created_at` columns.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
