//! SQLite implementation of the index store.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use fileindex_core::{ContentHash, FileRecord, IndexStore, StoreError, extension_of};

use crate::schema;

const UPSERT_SQL: &str = "INSERT INTO files (path, name, size, created, modified, hash)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT(path) DO UPDATE SET
        name = excluded.name,
        size = excluded.size,
        created = excluded.created,
        modified = excluded.modified,
        hash = excluded.hash";

const SELECT_COLUMNS: &str = "SELECT path, name, size, created, modified, hash FROM files";

/// Index store backed by a single SQLite connection.
///
/// The connection sits behind a mutex so the store can be shared between the
/// scan worker and readers; SQLite serializes the actual writes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        tracing::debug!(path = %path.display(), "opening index database");

        let conn = Connection::open(&path)
            .map_err(|e| StoreError::backend("open index database failed", e))?;
        Self::from_connection(conn, path)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::backend("open in-memory database failed", e))?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, path: PathBuf) -> Result<Self, StoreError> {
        conn.execute_batch(schema::PRAGMAS)
            .map_err(|e| StoreError::backend("set database pragmas failed", e))?;
        schema::bootstrap(&conn).map_err(|e| StoreError::backend("create schema failed", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Location of the database (`:memory:` for in-memory stores).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the record stored for `path`.
    pub fn get(&self, path: &Path) -> Result<Option<FileRecord>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE path = ?1"),
                params![path_key(path)],
                RawRow::from_row,
            )
            .optional()
            .map_err(|e| StoreError::backend("lookup by path failed", e))?;
        raw.map(RawRow::into_record).transpose()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl IndexStore for SqliteStore {
    fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        schema::bootstrap(&conn).map_err(|e| StoreError::backend("create schema failed", e))
    }

    fn upsert(&self, record: &FileRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(UPSERT_SQL)
            .map_err(|e| StoreError::backend("prepare upsert failed", e))?;
        stmt.execute(params![
            path_key(&record.path),
            record.name.as_str(),
            i64::try_from(record.size).unwrap_or(i64::MAX),
            record.created.map(format_time),
            format_time(record.modified),
            record.hash.map(|h| h.to_hex()),
        ])
        .map_err(|e| StoreError::backend("upsert failed", e))?;
        Ok(())
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM files", [])
            .map_err(|e| StoreError::backend("clear index failed", e))?;
        tracing::info!(removed, "cleared index");
        Ok(())
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<FileRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(&format!(
                "{SELECT_COLUMNS} ORDER BY modified DESC, path ASC LIMIT ?1"
            ))
            .map_err(|e| StoreError::backend("prepare listing failed", e))?;
        let rows = stmt
            .query_map(
                params![i64::try_from(limit).unwrap_or(i64::MAX)],
                RawRow::from_row,
            )
            .map_err(|e| StoreError::backend("list recent files failed", e))?;

        let mut records = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| StoreError::backend("read row failed", e))?;
            records.push(raw.into_record()?);
        }
        Ok(records)
    }

    fn list_distinct_extensions(&self) -> Result<BTreeSet<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached("SELECT DISTINCT name FROM files")
            .map_err(|e| StoreError::backend("prepare extension listing failed", e))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| StoreError::backend("list extensions failed", e))?;

        let mut extensions = BTreeSet::new();
        for name in names {
            let name = name.map_err(|e| StoreError::backend("read row failed", e))?;
            extensions.insert(extension_of(&name));
        }
        Ok(extensions)
    }

    fn count(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
            .map_err(|e| StoreError::backend("count records failed", e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

/// Column values as stored, before decoding.
struct RawRow {
    path: String,
    name: String,
    size: i64,
    created: Option<String>,
    modified: String,
    hash: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            name: row.get(1)?,
            size: row.get(2)?,
            created: row.get(3)?,
            modified: row.get(4)?,
            hash: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<FileRecord, StoreError> {
        let corrupt = |message: String| StoreError::CorruptRow {
            path: self.path.clone(),
            message,
        };

        let modified = parse_time(&self.modified).map_err(&corrupt)?;
        let created = self
            .created
            .as_deref()
            .map(parse_time)
            .transpose()
            .map_err(&corrupt)?;
        let hash = match self.hash.as_deref() {
            Some(hex) => Some(
                ContentHash::from_hex(hex)
                    .ok_or_else(|| corrupt(format!("invalid hash {hex:?}")))?,
            ),
            None => None,
        };

        Ok(FileRecord {
            path: PathBuf::from(&self.path),
            name: self.name.into(),
            size: u64::try_from(self.size).unwrap_or(0),
            created,
            modified,
            hash,
        })
    }
}

// Non-UTF-8 paths are stored lossily.
fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// Fixed-width UTC so that text order matches time order.
fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(text: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp {text:?}: {e}"))
}
