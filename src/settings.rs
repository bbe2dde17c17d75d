//! Persistent settings loaded from a TOML file.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default database file, relative to the working directory.
pub const DEFAULT_DB_FILE: &str = "file_index.db";

/// Settings read from `settings.toml`; command-line flags override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Location of the index database.
    pub db_path: PathBuf,
    /// Directory to index when none is given (home directory if unset).
    pub root: Option<PathBuf>,
    /// Stop each scan after the demo cap.
    pub demo_mode: bool,
    /// Index hidden files and directories.
    pub include_hidden: bool,
    /// Follow symbolic links while walking.
    pub follow_symlinks: bool,
    /// Glob patterns for names to leave out.
    pub ignore_patterns: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE),
            root: None,
            demo_mode: false,
            include_hidden: true,
            follow_symlinks: false,
            ignore_patterns: Vec::new(),
        }
    }
}

impl Settings {
    /// Get the default config file path.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("fileindex").join("settings.toml"))
    }

    /// Load settings from `path`, or from the default location.
    ///
    /// An explicit path must exist and parse. A missing default file yields
    /// the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => match Self::config_path().filter(|p| p.is_file()) {
                Some(path) => Self::read(&path),
                None => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Directory to index: explicit argument, then settings, then home.
    pub fn resolve_root(&self, arg: Option<PathBuf>) -> Option<PathBuf> {
        arg.or_else(|| self.root.clone()).or_else(dirs::home_dir)
    }
}
