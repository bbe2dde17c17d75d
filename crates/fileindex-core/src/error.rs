//! Error types for indexing operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that end an indexing job or keep one from starting.
///
/// Per-file problems (stat, read, hash) never surface here; they are counted
/// in the job's metadata and the traversal moves on.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The index store rejected a write.
    #[error("Index store failure: {0}")]
    Store(#[from] StoreError),
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors raised by an [`IndexStore`](crate::IndexStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database reported an error.
    #[error("{context}: {source}")]
    Backend {
        context: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A stored row could not be decoded into a record.
    #[error("Corrupt row for {path}: {message}")]
    CorruptRow { path: String, message: String },

    /// The store's connection lock was poisoned by a panicking writer.
    #[error("Index store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Wrap a backend error with a short description of the failed step.
    pub fn backend(
        context: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            context,
            source: Box::new(source),
        }
    }
}

/// Rejections and failures of job controller operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A job is already in flight; at most one runs at a time.
    #[error("An indexing job is already running")]
    AlreadyRunning,

    /// The operation needs the controller to be idle.
    #[error("Cannot {operation} while an indexing job is running")]
    JobActive { operation: &'static str },

    /// `start` was called outside a Tokio runtime.
    #[error("No Tokio runtime available to run the indexing job")]
    NoRuntime,

    /// The job configuration was rejected before launch.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The store failed during a control operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}
