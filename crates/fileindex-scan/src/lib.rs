//! Scanning engine and job controller for fileindex.
//!
//! # Overview
//!
//! `fileindex-scan` walks a directory tree and writes one
//! [`FileRecord`](fileindex_core::FileRecord) per regular file into an
//! [`IndexStore`](fileindex_core::IndexStore). Key pieces:
//!
//! - **[`ScanJob`]**: one traversal via jwalk, with BLAKE3 content hashing,
//!   an optional file cap, and per-file cancellation checkpoints
//! - **[`JobController`]**: starts jobs on Tokio's blocking pool, refuses
//!   overlapping jobs, and publishes status snapshots
//! - **[`hash_file`]**: whole-file hashing that never fails the caller
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fileindex_scan::JobController;
//! use fileindex_store::SqliteStore;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::open("file_index.db")?);
//! let controller = JobController::new(store);
//!
//! controller.start("/home/user", true)?;
//! let status = controller.wait_until_idle().await;
//! if let Some(meta) = status.metadata {
//!     println!("Indexed {} files", meta.file_count);
//! }
//! # Ok(())
//! # }
//! ```

mod controller;
mod hasher;
mod job;
mod progress;

pub use controller::JobController;
pub use hasher::{hash_bytes, hash_file, try_hash_file};
pub use job::ScanJob;
pub use progress::{PUBLISH_EVERY_FILES, PUBLISH_INTERVAL};

// Re-export core types for convenience
pub use fileindex_core::{
    ControlError, FileRecord, IndexStore, JobState, JobStatus, ScanConfig, ScanError,
    ScanMetadata, ScanOutcome,
};
