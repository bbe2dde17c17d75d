//! Scan configuration types.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Number of files a demo-mode scan indexes before stopping itself.
pub const DEMO_CAP: u64 = 50;

/// Configuration for a single indexing pass.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root directory to index.
    pub root: PathBuf,

    /// Stop after this many files have been indexed (None = no cap).
    #[builder(default)]
    #[serde(default)]
    pub max_files: Option<u64>,

    /// Follow symbolic links.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Glob patterns matched against entry names. Matching directories are
    /// pruned together with their subtree.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Exact paths that are never indexed (the index database itself).
    #[builder(default)]
    #[serde(default)]
    pub exclude_paths: Vec<PathBuf>,

    /// Number of threads for directory reads (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,
}

fn default_true() -> bool {
    true
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        if let Some(Some(0)) = self.max_files {
            return Err("File cap must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple uncapped config for indexing a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_files: None,
            follow_symlinks: false,
            include_hidden: true,
            ignore_patterns: Vec::new(),
            exclude_paths: Vec::new(),
            threads: 0,
        }
    }

    /// Enable or disable the demo-mode cap of [`DEMO_CAP`] files.
    pub fn with_cap(mut self, enabled: bool) -> Self {
        self.max_files = enabled.then_some(DEMO_CAP);
        self
    }

    /// Never index `path`.
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude_paths.push(path.into());
        self
    }

    /// Check whether `path` is on the exclusion list.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclude_paths.iter().any(|p| p == path)
    }

    /// Whether `count` indexed files exhausts the configured cap.
    pub fn cap_reached(&self, count: u64) -> bool {
        self.max_files.is_some_and(|cap| count >= cap)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}
