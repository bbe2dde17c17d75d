//! Indexed file records.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// BLAKE3 content digest of a file's full contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Extension of a file name: everything from the last `.` on, lowercased.
///
/// Names without a `.` have an empty extension. A dotfile such as `.bashrc`
/// is its own extension.
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) => name[idx..].to_lowercase(),
        None => String::new(),
    }
}

/// One indexed file, keyed by its absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path (unique key in the index).
    pub path: PathBuf,

    /// Base name.
    pub name: CompactString,

    /// Size in bytes.
    pub size: u64,

    /// Creation time, when the filesystem reports one.
    pub created: Option<DateTime<Utc>>,

    /// Last modification time.
    pub modified: DateTime<Utc>,

    /// Content digest, or None if the file could not be read in full.
    pub hash: Option<ContentHash>,
}

impl FileRecord {
    /// Lowercased extension of the record's name.
    pub fn extension(&self) -> String {
        extension_of(&self.name)
    }

    /// Whether the content digest was computed.
    pub fn is_hashed(&self) -> bool {
        self.hash.is_some()
    }
}
