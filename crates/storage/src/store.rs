//! The read-write store handle owned by ingestion and the report catalog.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::StoreError;
use crate::schema::{self, SchemaDescriptor};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const BOOTSTRAP: &str = "
CREATE TABLE IF NOT EXISTS data_files (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    path          TEXT NOT NULL,
    table_name    TEXT NOT NULL,
    content_hash  TEXT NOT NULL,
    detected_at   TEXT NOT NULL,
    ingested_at   TEXT,
    row_count     INTEGER,
    status        TEXT NOT NULL
                  CHECK (status IN ('pending', 'ingested', 'archived', 'failed')),
    archived_to   TEXT,
    detail        TEXT,
    UNIQUE (path, content_hash)
);

CREATE TABLE IF NOT EXISTS table_columns (
    table_name   TEXT NOT NULL,
    position     INTEGER NOT NULL,
    column_name  TEXT NOT NULL,
    column_type  TEXT NOT NULL CHECK (column_type IN ('INTEGER', 'REAL', 'TEXT')),
    added_at     TEXT NOT NULL,
    PRIMARY KEY (table_name, column_name)
);

CREATE TABLE IF NOT EXISTS data_records (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name  TEXT NOT NULL,
    file_id     INTEGER NOT NULL REFERENCES data_files (id),
    row_hash    TEXT NOT NULL,
    UNIQUE (table_name, row_hash)
);

CREATE TABLE IF NOT EXISTS reports (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT NOT NULL,
    version      INTEGER NOT NULL,
    prompt       TEXT NOT NULL,
    script_text  TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    UNIQUE (name, version)
);

CREATE TABLE IF NOT EXISTS execution_log (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id    INTEGER REFERENCES reports (id),
    started_at   TEXT NOT NULL,
    duration_ms  INTEGER NOT NULL,
    outcome      TEXT NOT NULL
                 CHECK (outcome IN ('success', 'validation-rejected', 'runtime-error', 'timeout')),
    detail       TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS execution_log_no_update BEFORE UPDATE ON execution_log
BEGIN SELECT RAISE(ABORT, 'execution_log is append-only'); END;
CREATE TRIGGER IF NOT EXISTS execution_log_no_delete BEFORE DELETE ON execution_log
BEGIN SELECT RAISE(ABORT, 'execution_log is append-only'); END;
CREATE TRIGGER IF NOT EXISTS reports_no_update BEFORE UPDATE ON reports
BEGIN SELECT RAISE(ABORT, 'reports are immutable; save a new version'); END;
CREATE TRIGGER IF NOT EXISTS reports_no_delete BEFORE DELETE ON reports
BEGIN SELECT RAISE(ABORT, 'reports are immutable; save a new version'); END;
";

/// Read-write handle on the sift store. Only ingestion and the report
/// catalog hold one; scripts get a [`crate::QueryHandle`].
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        let store = Store {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.bootstrap()?;
        tracing::debug!(path = %path.display(), "store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Store {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.bootstrap()?;
        Ok(store)
    }

    fn bootstrap(&self) -> Result<(), StoreError> {
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        // Rollback journal: a reader sees either none or all of a file's rows.
        self.conn
            .execute_batch("PRAGMA journal_mode = DELETE; PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(BOOTSTRAP)?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Every table with its current schema, ordered by name.
    pub fn schemas(&self) -> Result<Vec<SchemaDescriptor>, StoreError> {
        let mut out = Vec::new();
        for table in schema::list_tables(&self.conn)? {
            if let Some(descriptor) = schema::load(&self.conn, &table)? {
                out.push(descriptor);
            }
        }
        Ok(out)
    }

    pub fn schema(&self, table: &str) -> Result<SchemaDescriptor, StoreError> {
        schema::load(&self.conn, table)?
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    pub fn row_count(&self, table: &str) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM data_records WHERE table_name = ?1",
            [table],
            |row| row.get(0),
        )?)
    }
}

/// Current UTC time as an RFC 3339 string.
pub fn timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
