//! Local SQLite storage for the print subsystem.
//!
//! Owns a single `local_settings` category/key/value table holding the
//! persisted print-settings blob. Errors stay stringly at this seam and
//! are mapped to [`crate::error::PrintError::Settings`] at the public
//! boundary.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::info;

/// Shared handle to the subsystem database.
pub struct Db {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Open (or create) the database at `{data_dir}/orderslip.db`.
pub fn init(data_dir: &Path) -> Result<Db, String> {
    fs::create_dir_all(data_dir).map_err(|e| format!("Failed to create data dir: {e}"))?;

    let db_path = data_dir.join("orderslip.db");
    info!("Opening database at {}", db_path.display());

    let conn = open_and_configure(&db_path)?;
    Ok(Db {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// In-memory database for tests.
pub fn init_in_memory() -> Result<Db, String> {
    let conn = Connection::open_in_memory().map_err(|e| e.to_string())?;
    create_schema(&conn)?;
    Ok(Db {
        conn: Mutex::new(conn),
        db_path: PathBuf::from(":memory:"),
    })
}

fn open_and_configure(db_path: &Path) -> Result<Connection, String> {
    let conn = Connection::open(db_path).map_err(|e| format!("Failed to open database: {e}"))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| format!("Failed to set WAL mode: {e}"))?;
    conn.pragma_update(None, "busy_timeout", 5000)
        .map_err(|e| format!("Failed to set busy timeout: {e}"))?;

    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );",
    )
    .map_err(|e| format!("Failed to create schema: {e}"))
}

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> Result<(), String> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )
    .map_err(|e| format!("set_setting: {e}"))?;
    Ok(())
}
