//! Core types and traits for fileindex.
//!
//! This crate provides the data structures shared by the scan engine, the
//! index store and the command-line front end: file records, job metadata,
//! configuration, errors, and the [`IndexStore`] trait.

mod config;
mod error;
mod metadata;
mod record;
mod store;

pub use config::{DEMO_CAP, ScanConfig, ScanConfigBuilder};
pub use error::{ControlError, ScanError, StoreError};
pub use metadata::{JobState, JobStatus, ScanMetadata, ScanOutcome};
pub use record::{ContentHash, FileRecord, extension_of};
pub use store::IndexStore;
