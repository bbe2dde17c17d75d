//! Job state and per-job summary metadata.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Lifecycle state of the job controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum JobState {
    /// No job in flight.
    #[default]
    #[strum(to_string = "idle")]
    Idle,
    /// A job is traversing the tree.
    #[strum(to_string = "running")]
    Running,
    /// A stop was requested; the job exits at its next file checkpoint.
    #[strum(to_string = "stopping")]
    StopRequested,
}

impl JobState {
    /// Whether a job is still in flight (running or winding down).
    pub fn is_active(self) -> bool {
        !matches!(self, JobState::Idle)
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// The whole tree was traversed.
    Completed,
    /// The configured file cap was reached.
    CapReached,
    /// A stop was requested.
    Stopped,
    /// The store rejected a write; the job ended early.
    Failed { message: String },
}

/// Summary of one indexing pass, published as immutable snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMetadata {
    /// Root directory of the pass.
    pub root: PathBuf,
    /// When the pass started.
    pub start_time: DateTime<Utc>,
    /// When the pass ended (None while running).
    pub end_time: Option<DateTime<Utc>>,
    /// Files indexed, including those whose hash failed.
    pub file_count: u64,
    /// Total size of indexed files.
    pub bytes_indexed: u64,
    /// Files indexed without a content hash.
    pub hash_failures: u64,
    /// Files and directory entries that could not be read at all.
    pub skipped: u64,
    /// Lowercased extension to occurrence count.
    pub file_type_histogram: BTreeMap<String, u64>,
    /// Set once the pass has ended.
    pub outcome: Option<ScanOutcome>,
}

impl ScanMetadata {
    /// Fresh metadata for a pass starting now.
    pub fn begin(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            start_time: Utc::now(),
            end_time: None,
            file_count: 0,
            bytes_indexed: 0,
            hash_failures: 0,
            skipped: 0,
            file_type_histogram: BTreeMap::new(),
            outcome: None,
        }
    }

    /// Whether the pass has ended.
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Time spent so far, or in total once finished.
    pub fn elapsed(&self) -> chrono::Duration {
        self.end_time.unwrap_or_else(Utc::now) - self.start_time
    }

    /// Sum of histogram counts; equals `file_count` for a consistent snapshot.
    pub fn histogram_total(&self) -> u64 {
        self.file_type_histogram.values().sum()
    }
}

/// Point-in-time view of the controller: its state plus the latest snapshot.
#[derive(Debug, Clone, Default)]
pub struct JobStatus {
    /// Current lifecycle state.
    pub state: JobState,
    /// Latest metadata; None until the first job starts.
    pub metadata: Option<Arc<ScanMetadata>>,
}

impl JobStatus {
    /// Whether a job is in flight.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}
