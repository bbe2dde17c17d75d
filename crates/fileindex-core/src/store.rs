//! The persistence seam between the scan engine and the index database.

use std::collections::BTreeSet;

use crate::error::StoreError;
use crate::record::FileRecord;

/// Durable keyed storage for file records.
///
/// The scan job is the only writer while it runs, so implementations need no
/// coordination beyond being shareable across threads. Each `upsert` is its
/// own unit of work; there is no cross-record transaction.
pub trait IndexStore: Send + Sync {
    /// Create the schema if it does not exist. Idempotent.
    fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Insert `record`, or overwrite every field of the existing record with
    /// the same path.
    fn upsert(&self, record: &FileRecord) -> Result<(), StoreError>;

    /// Remove every record.
    fn clear_all(&self) -> Result<(), StoreError>;

    /// Up to `limit` records, most recently modified first.
    fn list_recent(&self, limit: usize) -> Result<Vec<FileRecord>, StoreError>;

    /// Distinct extensions derived from stored names.
    fn list_distinct_extensions(&self) -> Result<BTreeSet<String>, StoreError>;

    /// Number of stored records.
    fn count(&self) -> Result<u64, StoreError>;
}
