//! Table layout of the index database.

use rusqlite::Connection;

pub(crate) const STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY,
        path TEXT UNIQUE NOT NULL,
        name TEXT NOT NULL,
        size INTEGER NOT NULL,
        created TEXT,
        modified TEXT NOT NULL,
        hash TEXT
    );",
    "CREATE INDEX IF NOT EXISTS idx_files_modified ON files(modified DESC);",
];

pub(crate) const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;";

/// Create the table and its index if missing.
pub(crate) fn bootstrap(conn: &Connection) -> rusqlite::Result<()> {
    for statement in STATEMENTS {
        conn.execute_batch(statement)?;
    }
    Ok(())
}
