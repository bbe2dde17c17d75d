//! Running totals for an indexing job.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;

use fileindex_core::{FileRecord, ScanMetadata, ScanOutcome};

/// Publish a snapshot at least every this many indexed files.
pub const PUBLISH_EVERY_FILES: u64 = 100;

/// Publish a snapshot at least this often while files are being indexed.
pub const PUBLISH_INTERVAL: Duration = Duration::from_millis(250);

/// Accumulates a job's metadata privately; readers only ever see the
/// complete copies handed out by [`snapshot`](Self::snapshot).
#[derive(Debug)]
pub(crate) struct ScanTally {
    meta: ScanMetadata,
    last_publish: Instant,
    since_publish: u64,
}

impl ScanTally {
    pub fn new(root: &Path) -> Self {
        Self {
            meta: ScanMetadata::begin(root),
            last_publish: Instant::now(),
            since_publish: 0,
        }
    }

    pub fn record_file(&mut self, record: &FileRecord) {
        self.meta.file_count += 1;
        self.meta.bytes_indexed += record.size;
        if record.hash.is_none() {
            self.meta.hash_failures += 1;
        }
        *self
            .meta
            .file_type_histogram
            .entry(record.extension())
            .or_insert(0) += 1;
        self.since_publish += 1;
    }

    pub fn record_skip(&mut self) {
        self.meta.skipped += 1;
    }

    pub fn file_count(&self) -> u64 {
        self.meta.file_count
    }

    /// Whether enough has happened since the last snapshot to publish again.
    pub fn should_publish(&self) -> bool {
        self.since_publish >= PUBLISH_EVERY_FILES
            || (self.since_publish > 0 && self.last_publish.elapsed() >= PUBLISH_INTERVAL)
    }

    /// A complete copy of the current totals.
    pub fn snapshot(&mut self) -> ScanMetadata {
        self.last_publish = Instant::now();
        self.since_publish = 0;
        self.meta.clone()
    }

    /// Freeze the totals with an end time and outcome.
    pub fn finish(mut self, outcome: ScanOutcome) -> ScanMetadata {
        self.meta.end_time = Some(Utc::now());
        self.meta.outcome = Some(outcome);
        self.meta
    }
}
