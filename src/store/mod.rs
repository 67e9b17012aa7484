//! SQLite persistence for the file registry and the usage-edge table.
//!
//! Every statement goes through [`rusqlite::Connection::prepare_cached`],
//! and batch callers wrap their edits in one transaction via
//! [`UsageStore::begin`]; statements issued on the same connection while a
//! transaction is open participate in it automatically.

pub mod query;
pub mod schema;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::BTreeSet;
use std::path::Path;
use uuid::Uuid;

use crate::error::Result;
use crate::index::types::{FileRecord, UsageEdge};

const META_LAST_FULL_SCAN: &str = "last_full_scan";

const UPSERT_FILE_SQL: &str = "\
INSERT INTO files (id, path) VALUES (?1, ?2)
ON CONFLICT(id) DO UPDATE SET path = excluded.path";

const INSERT_EDGE_SQL: &str = "\
INSERT OR REPLACE INTO usages (combo, user_id, resource_id) VALUES (?1, ?2, ?3)";

const DELETE_EDGES_FOR_ID_SQL: &str = "\
DELETE FROM usages WHERE user_id = ?1 OR resource_id = ?1";

/// Handle to the usage database.
///
/// One store per process; opened lazily by the service and kept open for
/// its lifetime. All access is single-threaded cooperative, so there is no
/// locking discipline beyond "one logical operation in flight".
pub struct UsageStore {
    conn: Connection,
}

impl std::fmt::Debug for UsageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageStore").finish_non_exhaustive()
    }
}

impl UsageStore {
    /// Open (or create) the store at `path`. The schema is applied
    /// idempotently but not validated; call [`check_schema`](Self::check_schema)
    /// to detect a malformed layout.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: schema::open_database(path)?,
        })
    }

    /// An in-memory store with the schema applied (tests).
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: schema::open_in_memory()?,
        })
    }

    /// Validate the table layout.
    pub fn check_schema(&self) -> Result<()> {
        schema::check_schema(&self.conn)
    }

    /// Drop and recreate every table, discarding all data.
    pub fn reset_schema(&self) -> Result<()> {
        schema::reset_schema(&self.conn)
    }

    /// Begin a transaction covering every store call made until it is
    /// committed. Dropping the returned transaction rolls back.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // ─── Registry ───────────────────────────────────────────────

    /// Insert or overwrite a record by id.
    pub fn upsert_file(&self, record: &FileRecord) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(UPSERT_FILE_SQL)?;
        stmt.execute(params![
            record.id.to_string(),
            record.path.to_string_lossy()
        ])?;
        Ok(())
    }

    /// Remove a record and cascade-delete every edge touching it in either
    /// position. Returns whether a record existed.
    pub fn delete_file(&self, id: Uuid) -> Result<bool> {
        let key = id.to_string();
        let mut del_edges = self.conn.prepare_cached(DELETE_EDGES_FOR_ID_SQL)?;
        del_edges.execute(params![key])?;
        let mut del_file = self
            .conn
            .prepare_cached("DELETE FROM files WHERE id = ?1")?;
        Ok(del_file.execute(params![key])? > 0)
    }

    /// Path-keyed delete, for files already gone from disk (their id can no
    /// longer be recomputed). Removes every record stored under `path` and
    /// cascades edges. Returns the ids removed; empty means no-op.
    pub fn delete_file_by_path(&self, path: &Path) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = {
            let mut stmt = self
                .conn
                .prepare_cached("SELECT id FROM files WHERE path = ?1")?;
            let rows = stmt.query_and_then(params![path.to_string_lossy()], |row| {
                parse_uuid(row.get::<_, String>(0)?)
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        for &id in &ids {
            self.delete_file(id)?;
        }
        Ok(ids)
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<Option<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, path FROM files WHERE id = ?1")?;
        let record = stmt
            .query_row(params![id.to_string()], row_to_record)
            .optional()?;
        Ok(record)
    }

    pub fn find_by_path(&self, path: &Path) -> Result<Option<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, path FROM files WHERE path = ?1 LIMIT 1")?;
        let record = stmt
            .query_row(params![path.to_string_lossy()], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Full enumeration, ordered by path. Used by the rescan engine and by
    /// convergence tests.
    pub fn all_files(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, path FROM files ORDER BY path ASC")?;
        let rows = stmt.query_and_then([], |row| row_to_record(row))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    // ─── Edge store ─────────────────────────────────────────────

    /// Atomically clear all edges where `user` is the user, then insert the
    /// new set. Naturally idempotent.
    pub fn replace_edges_for(&self, user: Uuid, resources: &BTreeSet<Uuid>) -> Result<()> {
        let mut clear = self
            .conn
            .prepare_cached("DELETE FROM usages WHERE user_id = ?1")?;
        clear.execute(params![user.to_string()])?;

        let mut insert = self.conn.prepare_cached(INSERT_EDGE_SQL)?;
        for &resource in resources {
            let edge = UsageEdge::new(user, resource);
            insert.execute(params![
                edge.combo_key(),
                edge.user.to_string(),
                edge.resource.to_string()
            ])?;
        }
        Ok(())
    }

    /// Every stored edge, ordered by combo key (tests and reporting).
    pub fn all_edges(&self) -> Result<Vec<UsageEdge>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT user_id, resource_id FROM usages ORDER BY combo ASC")?;
        let rows = stmt.query_and_then([], |row| {
            Ok(UsageEdge::new(
                parse_uuid(row.get::<_, String>(0)?)?,
                parse_uuid(row.get::<_, String>(1)?)?,
            ))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    pub fn file_count(&self) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached("SELECT count(*) FROM files")?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn edge_count(&self) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached("SELECT count(*) FROM usages")?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ─── Meta ───────────────────────────────────────────────────

    /// Timestamp of the last completed full rescan, if any.
    pub fn last_full_scan(&self) -> Result<Option<DateTime<Utc>>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM meta WHERE key = ?1")?;
        let value: Option<String> = stmt
            .query_row(params![META_LAST_FULL_SCAN], |row| row.get(0))
            .optional()?;
        Ok(value
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|t| t.with_timezone(&Utc)))
    }

    pub fn set_last_full_scan(&self, when: DateTime<Utc>) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)")?;
        stmt.execute(params![META_LAST_FULL_SCAN, when.to_rfc3339()])?;
        Ok(())
    }
}

pub(crate) fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let id = parse_uuid(row.get::<_, String>(0)?)?;
    let path: String = row.get(1)?;
    Ok(FileRecord::new(id, path))
}

pub(crate) fn parse_uuid(value: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}
