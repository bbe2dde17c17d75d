//! SQLite-backed index store for fileindex.
//!
//! [`SqliteStore`] implements the [`IndexStore`](fileindex_core::IndexStore)
//! contract on a single `files` table keyed by path.
//!
//! # Example
//!
//! ```rust,no_run
//! use fileindex_core::IndexStore;
//! use fileindex_store::SqliteStore;
//!
//! let store = SqliteStore::open("file_index.db").unwrap();
//! for record in store.list_recent(100).unwrap() {
//!     println!("{} {}", record.modified, record.path.display());
//! }
//! ```

mod schema;
mod sqlite;

pub use sqlite::SqliteStore;
