//! A single indexing pass over a directory tree.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use jwalk::{Parallelism, WalkDir};
use tokio_util::sync::CancellationToken;

use fileindex_core::{FileRecord, IndexStore, ScanConfig, ScanError, ScanMetadata, ScanOutcome};

use crate::hasher::hash_file;
use crate::progress::ScanTally;

/// Walks a tree once, upserting one record per regular file.
///
/// The job checks its cancellation token before every entry, so a stop takes
/// effect after at most one more file. Records written before the stop stay
/// in the store.
pub struct ScanJob {
    config: ScanConfig,
    store: Arc<dyn IndexStore>,
    ignore: Option<Arc<GlobSet>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ScanJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanJob")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ScanJob {
    /// Validate `config` and prepare a job writing into `store`.
    ///
    /// Fails if the root is missing or not a directory, or if an ignore
    /// pattern does not parse.
    pub fn new(config: ScanConfig, store: Arc<dyn IndexStore>) -> Result<Self, ScanError> {
        let root = resolve_root(&config.root)?;
        let ignore = build_ignore_set(&config.ignore_patterns)?.map(Arc::new);
        let exclude_paths = config
            .exclude_paths
            .iter()
            .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
            .collect();

        Ok(Self {
            config: ScanConfig {
                root,
                exclude_paths,
                ..config
            },
            store,
            ignore,
            cancel: CancellationToken::new(),
        })
    }

    /// Use `token` as the stop signal.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Handle for requesting a stop from another thread.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The validated configuration (root is canonical).
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run the pass to completion, cap, stop or store failure.
    ///
    /// `publish` receives a fresh snapshot when the pass starts, periodically
    /// while it runs, and once more with the final totals. On a store failure
    /// the final snapshot carries [`ScanOutcome::Failed`] and the error is
    /// returned.
    pub fn run<F>(&self, mut publish: F) -> Result<ScanMetadata, ScanError>
    where
        F: FnMut(ScanMetadata),
    {
        let root = &self.config.root;
        tracing::info!(
            root = %root.display(),
            max_files = ?self.config.max_files,
            "indexing started"
        );

        let mut tally = ScanTally::new(root);
        publish(tally.snapshot());

        match self.walk(&mut tally, &mut publish) {
            Ok(outcome) => {
                let meta = tally.finish(outcome);
                tracing::info!(
                    root = %root.display(),
                    files = meta.file_count,
                    hash_failures = meta.hash_failures,
                    skipped = meta.skipped,
                    outcome = ?meta.outcome,
                    "indexing finished"
                );
                publish(meta.clone());
                Ok(meta)
            }
            Err(err) => {
                let meta = tally.finish(ScanOutcome::Failed {
                    message: err.to_string(),
                });
                tracing::error!(
                    root = %root.display(),
                    files = meta.file_count,
                    error = %err,
                    "indexing aborted"
                );
                publish(meta);
                Err(err)
            }
        }
    }

    fn walk<F>(&self, tally: &mut ScanTally, publish: &mut F) -> Result<ScanOutcome, ScanError>
    where
        F: FnMut(ScanMetadata),
    {
        if self.config.cap_reached(0) {
            return Ok(ScanOutcome::CapReached);
        }

        for entry_result in self.walker() {
            if self.cancel.is_cancelled() {
                tracing::info!(files = tally.file_count(), "stop requested, ending traversal");
                return Ok(ScanOutcome::Stopped);
            }

            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(
                        path = ?err.path(),
                        error = %err,
                        "skipping unreadable entry"
                    );
                    tally.record_skip();
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                if let Some(err) = &entry.read_children_error {
                    tracing::warn!(
                        path = %entry.path().display(),
                        error = %err,
                        "skipping unreadable directory"
                    );
                    tally.record_skip();
                }
                continue;
            }
            if !file_type.is_file() && !file_type.is_symlink() {
                continue;
            }

            let path = entry.path();
            if self.config.is_excluded(&path) {
                tracing::debug!(path = %path.display(), "excluded from index");
                continue;
            }

            // Unfollowed links are indexed under their own path when they
            // resolve to a regular file.
            let metadata = if file_type.is_symlink() {
                std::fs::metadata(&path)
            } else {
                entry.metadata().map_err(std::io::Error::from)
            };
            let metadata = match metadata {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "stat failed, skipping");
                    tally.record_skip();
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().to_string();
            let record = build_record(path, name, &metadata);
            if record.hash.is_none() {
                tracing::warn!(path = %record.path.display(), "hashing failed, indexing without hash");
            }

            self.store.upsert(&record)?;
            tracing::debug!(path = %record.path.display(), "indexed");

            tally.record_file(&record);
            if tally.should_publish() {
                publish(tally.snapshot());
            }

            if self.config.cap_reached(tally.file_count()) {
                tracing::info!(cap = ?self.config.max_files, "file cap reached, stopping");
                return Ok(ScanOutcome::CapReached);
            }
        }

        Ok(ScanOutcome::Completed)
    }

    fn walker(&self) -> WalkDir {
        let parallelism = match self.config.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            1 => Parallelism::Serial,
            n => Parallelism::RayonNewPool(n),
        };

        let walker = WalkDir::new(&self.config.root)
            .parallelism(parallelism)
            .skip_hidden(!self.config.include_hidden)
            .follow_links(self.config.follow_symlinks)
            .sort(true);

        match &self.ignore {
            Some(ignore) => {
                let ignore = Arc::clone(ignore);
                walker.process_read_dir(move |_depth, _path, _state, children| {
                    children.retain(|child| match child {
                        Ok(entry) => !ignore.is_match(&entry.file_name),
                        Err(_) => true,
                    });
                })
            }
            None => walker,
        }
    }
}

/// Canonicalize `root` and check that it is a directory.
pub(crate) fn resolve_root(root: &Path) -> Result<PathBuf, ScanError> {
    let root_path = root.canonicalize().map_err(|e| ScanError::io(root, e))?;
    if !root_path.is_dir() {
        return Err(ScanError::NotADirectory { path: root_path });
    }
    Ok(root_path)
}

fn build_ignore_set(patterns: &[String]) -> Result<Option<GlobSet>, ScanError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidConfig {
            message: format!("invalid ignore pattern {pattern:?}: {e}"),
        })?;
        builder.add(glob);
    }
    let set = builder.build().map_err(|e| ScanError::InvalidConfig {
        message: format!("invalid ignore patterns: {e}"),
    })?;
    Ok(Some(set))
}

/// Assemble the record for one regular file, hashing its contents.
fn build_record(path: PathBuf, name: String, metadata: &Metadata) -> FileRecord {
    let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
    let hash = hash_file(&path);

    FileRecord {
        name: name.into(),
        size: metadata.len(),
        created: metadata.created().ok().map(DateTime::<Utc>::from),
        modified: DateTime::<Utc>::from(modified),
        hash,
        path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    use fileindex_core::StoreError;
    use fileindex_store::SqliteStore;
    use tempfile::TempDir;

    use crate::hasher::hash_bytes;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::write(root.join("a.txt"), "hello").unwrap();
        fs::write(root.join("b.TXT"), "").unwrap();
        fs::write(root.join("c"), "no extension").unwrap();

        temp
    }

    fn memory_store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::open_in_memory().unwrap())
    }

    /// Store that accepts a fixed number of writes, then fails.
    struct FailingStore {
        remaining: Mutex<u32>,
    }

    impl IndexStore for FailingStore {
        fn ensure_schema(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn upsert(&self, _record: &FileRecord) -> Result<(), StoreError> {
            let mut remaining = self.remaining.lock().unwrap();
            if *remaining == 0 {
                return Err(StoreError::backend(
                    "upsert failed",
                    std::io::Error::other("disk full"),
                ));
            }
            *remaining -= 1;
            Ok(())
        }

        fn clear_all(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn list_recent(&self, _limit: usize) -> Result<Vec<FileRecord>, StoreError> {
            Ok(Vec::new())
        }

        fn list_distinct_extensions(
            &self,
        ) -> Result<std::collections::BTreeSet<String>, StoreError> {
            Ok(Default::default())
        }

        fn count(&self) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    #[test]
    fn test_three_file_scenario() {
        let temp = create_test_tree();
        let store = memory_store();

        let job = ScanJob::new(ScanConfig::new(temp.path()), store.clone()).unwrap();
        let meta = job.run(|_| {}).unwrap();

        assert_eq!(meta.file_count, 3);
        assert_eq!(meta.file_type_histogram.get(".txt"), Some(&2));
        assert_eq!(meta.file_type_histogram.get(""), Some(&1));
        assert_eq!(meta.file_type_histogram.len(), 2);
        assert_eq!(meta.outcome, Some(ScanOutcome::Completed));
        assert!(meta.end_time.is_some());
        assert_eq!(store.count().unwrap(), 3);

        let root = job.config().root.clone();
        let empty = store.get(&root.join("b.TXT")).unwrap().unwrap();
        assert_eq!(empty.size, 0);
        assert_eq!(empty.hash, Some(hash_bytes(b"")));

        let hello = store.get(&root.join("a.txt")).unwrap().unwrap();
        assert_eq!(hello.size, 5);
        assert_eq!(hello.hash, Some(hash_bytes(b"hello")));
    }

    #[test]
    fn test_rescan_does_not_duplicate() {
        let temp = create_test_tree();
        let store = memory_store();

        for _ in 0..2 {
            let job = ScanJob::new(ScanConfig::new(temp.path()), store.clone()).unwrap();
            job.run(|_| {}).unwrap();
        }

        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_rescan_replaces_changed_content() {
        let temp = create_test_tree();
        let store = memory_store();

        let job = ScanJob::new(ScanConfig::new(temp.path()), store.clone()).unwrap();
        job.run(|_| {}).unwrap();

        fs::write(temp.path().join("a.txt"), "changed content").unwrap();
        job.run(|_| {}).unwrap();

        let record = store
            .get(&job.config().root.join("a.txt"))
            .unwrap()
            .unwrap();
        assert_eq!(record.size, 15);
        assert_eq!(record.hash, Some(hash_bytes(b"changed content")));
    }

    #[test]
    fn test_cap_limits_upserts() {
        let temp = TempDir::new().unwrap();
        for i in 0..5 {
            fs::write(temp.path().join(format!("file{i}.dat")), "x").unwrap();
        }
        let store = memory_store();

        let config = ScanConfig::builder()
            .root(temp.path())
            .max_files(Some(2u64))
            .build()
            .unwrap();
        let meta = ScanJob::new(config, store.clone())
            .unwrap()
            .run(|_| {})
            .unwrap();

        assert_eq!(meta.file_count, 2);
        assert_eq!(meta.outcome, Some(ScanOutcome::CapReached));
        assert!(meta.end_time.is_some());
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_cancelled_before_start_indexes_nothing() {
        let temp = create_test_tree();
        let store = memory_store();

        let job = ScanJob::new(ScanConfig::new(temp.path()), store.clone()).unwrap();
        job.cancel_token().cancel();
        let meta = job.run(|_| {}).unwrap();

        assert_eq!(meta.file_count, 0);
        assert_eq!(meta.outcome, Some(ScanOutcome::Stopped));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_stop_from_publish_callback() {
        let temp = TempDir::new().unwrap();
        for i in 0..(crate::progress::PUBLISH_EVERY_FILES * 2) {
            fs::write(temp.path().join(format!("f{i:04}.txt")), "x").unwrap();
        }
        let store = memory_store();

        let config = ScanConfig::builder()
            .root(temp.path())
            .threads(1usize)
            .build()
            .unwrap();
        let job = ScanJob::new(config, store.clone()).unwrap();
        let token = job.cancel_token();
        let mut published = 0;
        let meta = job
            .run(|snapshot| {
                published += 1;
                if snapshot.file_count > 0 {
                    token.cancel();
                }
            })
            .unwrap();

        assert!(published >= 2);
        assert_eq!(meta.outcome, Some(ScanOutcome::Stopped));
        assert!(meta.file_count < crate::progress::PUBLISH_EVERY_FILES * 2);
        assert_eq!(store.count().unwrap(), meta.file_count);
        assert_eq!(meta.histogram_total(), meta.file_count);
    }

    #[test]
    fn test_store_failure_ends_job() {
        let temp = create_test_tree();
        let store = Arc::new(FailingStore {
            remaining: Mutex::new(1),
        });

        let job = ScanJob::new(ScanConfig::new(temp.path()), store).unwrap();
        let mut last = None;
        let err = job.run(|snapshot| last = Some(snapshot)).unwrap_err();

        assert!(matches!(err, ScanError::Store(_)));
        let last = last.unwrap();
        assert_eq!(last.file_count, 1);
        assert!(last.is_finished());
        assert!(matches!(last.outcome, Some(ScanOutcome::Failed { .. })));
    }

    #[test]
    fn test_unreadable_file_is_indexed_without_hash() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let temp = TempDir::new().unwrap();
            let secret = temp.path().join("secret.key");
            fs::write(&secret, "top secret").unwrap();
            fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();

            if fs::read(&secret).is_ok() {
                eprintln!("skipping unreadable-file check: running with read access to mode 000 files");
                return;
            }

            let store = memory_store();
            let job = ScanJob::new(ScanConfig::new(temp.path()), store.clone()).unwrap();
            let meta = job.run(|_| {}).unwrap();

            assert_eq!(meta.file_count, 1);
            assert_eq!(meta.hash_failures, 1);
            let record = store
                .get(&job.config().root.join("secret.key"))
                .unwrap()
                .unwrap();
            assert_eq!(record.size, 10);
            assert!(record.hash.is_none());
        }
    }

    #[test]
    fn test_ignore_patterns_prune_directories() {
        let temp = create_test_tree();
        fs::create_dir(temp.path().join("node_modules")).unwrap();
        fs::write(temp.path().join("node_modules/dep.js"), "x").unwrap();
        fs::write(temp.path().join("debug.log"), "x").unwrap();
        let store = memory_store();

        let config = ScanConfig::builder()
            .root(temp.path())
            .ignore_patterns(vec!["node_modules".to_string(), "*.log".to_string()])
            .build()
            .unwrap();
        let meta = ScanJob::new(config, store.clone())
            .unwrap()
            .run(|_| {})
            .unwrap();

        assert_eq!(meta.file_count, 3);
        assert!(!meta.file_type_histogram.contains_key(".js"));
        assert!(!meta.file_type_histogram.contains_key(".log"));
    }

    #[test]
    fn test_excluded_paths_are_skipped() {
        let temp = create_test_tree();
        let store = memory_store();

        let config = ScanConfig::new(temp.path()).exclude(temp.path().join("c"));
        let meta = ScanJob::new(config, store.clone())
            .unwrap()
            .run(|_| {})
            .unwrap();

        assert_eq!(meta.file_count, 2);
        assert!(!meta.file_type_histogram.contains_key(""));
    }

    #[test]
    fn test_nested_directories_are_walked() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("x/y/z")).unwrap();
        fs::write(temp.path().join("x/one.md"), "1").unwrap();
        fs::write(temp.path().join("x/y/z/two.MD"), "22").unwrap();
        let store = memory_store();

        let meta = ScanJob::new(ScanConfig::new(temp.path()), store.clone())
            .unwrap()
            .run(|_| {})
            .unwrap();

        assert_eq!(meta.file_count, 2);
        assert_eq!(meta.bytes_indexed, 3);
        assert_eq!(meta.file_type_histogram.get(".md"), Some(&2));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("hidden.txt"), "x").unwrap();
        fs::write(temp.path().join("one.txt"), "1").unwrap();
        fs::write(temp.path().join("two.txt"), "2").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            eprintln!("skipping unreadable-directory check: running with read access to mode 000 directories");
            return;
        }

        let store = memory_store();
        let result = ScanJob::new(ScanConfig::new(temp.path()), store.clone())
            .unwrap()
            .run(|_| {});
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        let meta = result.unwrap();

        assert_eq!(meta.file_count, 2);
        assert!(meta.skipped >= 1);
        assert_eq!(meta.outcome, Some(ScanOutcome::Completed));
        assert_eq!(store.count().unwrap(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_followed_link_is_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("one.txt"), "1").unwrap();
        fs::write(temp.path().join("two.txt"), "2").unwrap();
        std::os::unix::fs::symlink(temp.path().join("gone.txt"), temp.path().join("dangling"))
            .unwrap();
        let store = memory_store();

        let config = ScanConfig::builder()
            .root(temp.path())
            .follow_symlinks(true)
            .build()
            .unwrap();
        let meta = ScanJob::new(config, store.clone())
            .unwrap()
            .run(|_| {})
            .unwrap();

        assert_eq!(meta.file_count, 2);
        assert_eq!(meta.skipped, 1);
        assert_eq!(meta.outcome, Some(ScanOutcome::Completed));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_is_indexed_under_link_path() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("file000.txt"), "target bytes").unwrap();
        std::os::unix::fs::symlink(temp.path().join("file000.txt"), temp.path().join("link.txt"))
            .unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("sub"), temp.path().join("sub_link")).unwrap();
        let store = memory_store();

        let job = ScanJob::new(ScanConfig::new(temp.path()), store.clone()).unwrap();
        let meta = job.run(|_| {}).unwrap();

        assert_eq!(meta.file_count, 2);
        assert_eq!(meta.skipped, 0);
        let link = store
            .get(&job.config().root.join("link.txt"))
            .unwrap()
            .unwrap();
        assert_eq!(link.size, 12);
        assert_eq!(link.hash, Some(hash_bytes(b"target bytes")));
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_link_is_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("file000.txt"), "x").unwrap();
        std::os::unix::fs::symlink(temp.path().join("missing.txt"), temp.path().join("broken"))
            .unwrap();
        let store = memory_store();

        let meta = ScanJob::new(ScanConfig::new(temp.path()), store.clone())
            .unwrap()
            .run(|_| {})
            .unwrap();

        assert_eq!(meta.file_count, 1);
        assert_eq!(meta.skipped, 1);
        assert_eq!(meta.outcome, Some(ScanOutcome::Completed));
    }

    #[test]
    fn test_invalid_root_rejected() {
        let temp = create_test_tree();
        let store = memory_store();

        let missing = ScanJob::new(ScanConfig::new(temp.path().join("nope")), store.clone());
        assert!(matches!(missing, Err(ScanError::NotFound { .. })));

        let file = ScanJob::new(ScanConfig::new(temp.path().join("a.txt")), store);
        assert!(matches!(file, Err(ScanError::NotADirectory { .. })));
    }

    #[test]
    fn test_invalid_ignore_pattern_rejected() {
        let temp = create_test_tree();
        let config = ScanConfig::builder()
            .root(temp.path())
            .ignore_patterns(vec!["[unclosed".to_string()])
            .build()
            .unwrap();

        let result = ScanJob::new(config, memory_store());
        assert!(matches!(result, Err(ScanError::InvalidConfig { .. })));
    }
}
