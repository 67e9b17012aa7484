//! Schema management for the usage database.
//!
//! Two data tables plus a small meta table. Creation is idempotent;
//! validation is strict so an outdated or corrupted layout is detected at
//! open time and recovered by a drop-and-recreate.

use rusqlite::Connection;
use tracing::debug;

use crate::error::{Error, Result};

/// Idempotent schema, applied at every open.
///
/// `combo` is `"{user_id}:{resource_id}"`, which makes the pair unique and
/// upsert-by-replace well defined. The two secondary indexes keep both
/// query directions sub-linear.
const CREATE_SCHEMA_SQL: &str = "\
CREATE TABLE IF NOT EXISTS files (
    id   TEXT PRIMARY KEY,
    path TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS usages (
    combo       TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    resource_id TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_usages_user ON usages(user_id);
CREATE INDEX IF NOT EXISTS idx_usages_resource ON usages(resource_id);
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);";

const DROP_SCHEMA_SQL: &str = "\
DROP TABLE IF EXISTS files;
DROP TABLE IF EXISTS usages;
DROP TABLE IF EXISTS meta;";

/// Open (or create) the database at `path` and apply the schema.
///
/// A driver-level open failure maps to [`Error::StorageUnavailable`] so the
/// caller can degrade to a disabled state instead of crashing.
pub fn open_database(path: &std::path::Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        }
    }
    let conn =
        Connection::open(path).map_err(|e| Error::StorageUnavailable(e.to_string()))?;
    conn.execute_batch(CREATE_SCHEMA_SQL)?;
    debug!(db = %path.display(), "usage database opened");
    Ok(conn)
}

/// Open an in-memory database with the schema applied (tests).
pub fn open_in_memory() -> Result<Connection> {
    let conn =
        Connection::open_in_memory().map_err(|e| Error::StorageUnavailable(e.to_string()))?;
    conn.execute_batch(CREATE_SCHEMA_SQL)?;
    Ok(conn)
}

/// Verify both data tables have exactly the expected columns.
pub fn check_schema(conn: &Connection) -> Result<()> {
    if table_columns(conn, "files")? != ["id", "path"] {
        return Err(Error::MalformedSchema);
    }
    if table_columns(conn, "usages")? != ["combo", "user_id", "resource_id"] {
        return Err(Error::MalformedSchema);
    }
    Ok(())
}

/// Drop and recreate every table. The caller is expected to follow up with
/// a full rescan.
pub fn reset_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(DROP_SCHEMA_SQL)?;
    conn.execute_batch(CREATE_SCHEMA_SQL)?;
    debug!("schema dropped and recreated");
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}
