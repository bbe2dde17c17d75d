//! Whole-file content hashing.

use std::io;
use std::path::Path;

use fileindex_core::ContentHash;

/// Hash the full contents of `path` with BLAKE3.
///
/// Large files are memory-mapped; small and special files are read. Any
/// failure (missing file, permission denied, I/O error) yields `None` so the
/// caller can keep going with the next file.
pub fn hash_file(path: &Path) -> Option<ContentHash> {
    match try_hash_file(path) {
        Ok(hash) => Some(hash),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "hashing failed");
            None
        }
    }
}

/// Hash the full contents of `path`, reporting why it failed.
pub fn try_hash_file(path: &Path) -> io::Result<ContentHash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap(path)?;
    Ok(ContentHash::new(*hasher.finalize().as_bytes()))
}

/// Hash an in-memory buffer the same way files are hashed.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::new(*blake3::hash(bytes).as_bytes())
}
