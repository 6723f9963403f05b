//! Parallel snapshot construction
//!
//! [`SnapshotScanner`] drains a shared queue of file paths with a fixed set of
//! worker threads. Every worker repeats three steps:
//!
//! 1. lock, pop one path, unlock
//! 2. hash and stat the file with no lock held
//! 3. lock, insert the record (or the failure) and bump the progress counter,
//!    unlock
//!
//! The queue, the snapshot, the failure list and the counter live behind one
//! `parking_lot::Mutex`, so the count never disagrees with the content and the
//! critical sections stay O(1) per file.
//!
//! A file that cannot be read does not stop the scan. It is logged, recorded
//! as a [`ScanFailure`] and left out of the snapshot. Identical input paths
//! are processed once; two distinct paths that map to the same identifier
//! keep the first record and report the second as a failure.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mark_files::metadata::FsRecordProvider;
//! use mark_files::scanner::SnapshotScanner;
//! use mark_files::types::ProgressInfo;
//! use std::path::PathBuf;
//!
//! let scanner = SnapshotScanner::new(PathBuf::from("./data"));
//! let outcome = scanner.scan::<_, fn(ProgressInfo)>(
//!     vec![PathBuf::from("./data/a.txt")],
//!     &FsRecordProvider,
//!     None,
//! );
//! println!("{} records, {} failures", outcome.snapshot.len(), outcome.failures.len());
//! ```

use crate::error::MarkError;
use crate::metadata::RecordProvider;
use crate::snapshot::Snapshot;
use crate::types::{FileId, FileRecord, ProgressInfo, ScanFailure};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

/// Result of a scan
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// One record per successfully processed path
    pub snapshot: Snapshot,
    /// Paths that could not be recorded, sorted by path
    pub failures: Vec<ScanFailure>,
}

/// Builds a [`Snapshot`] from a list of files using a bounded worker pool
#[derive(Debug, Clone)]
pub struct SnapshotScanner {
    /// Root used to normalize paths into identifiers
    root: PathBuf,
    /// Upper bound on worker threads
    max_workers: usize,
}

struct ScanState {
    queue: VecDeque<PathBuf>,
    snapshot: Snapshot,
    failures: Vec<ScanFailure>,
    processed: usize,
}

impl SnapshotScanner {
    /// Create a scanner using one worker per CPU core
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            max_workers: num_cpus::get(),
        }
    }

    /// Set the upper bound on worker threads (minimum 1)
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    /// Number of workers a scan of `file_count` files would spawn
    pub fn worker_count(&self, file_count: usize) -> usize {
        self.max_workers.min(file_count)
    }

    /// Scan `paths` and return the resulting snapshot
    ///
    /// An empty input spawns no workers and yields an empty snapshot. The
    /// progress callback runs outside the lock, once per processed path.
    pub fn scan<P, F>(&self, paths: Vec<PathBuf>, provider: &P, progress: Option<F>) -> ScanOutcome
    where
        P: RecordProvider + ?Sized,
        F: Fn(ProgressInfo) + Send + Sync,
    {
        let start = Instant::now();
        let mut paths = paths;
        paths.sort();
        paths.dedup();
        let total = paths.len();
        let workers = self.worker_count(total);

        let state = Mutex::new(ScanState {
            queue: paths.into(),
            snapshot: Snapshot::new(),
            failures: Vec::new(),
            processed: 0,
        });

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| self.run_worker(&state, provider, progress.as_ref(), total));
            }
        });

        let ScanState {
            snapshot,
            mut failures,
            ..
        } = state.into_inner();
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(
            "Scanned {} files with {} workers in {:?} ({} failed)",
            total,
            workers,
            start.elapsed(),
            failures.len()
        );

        ScanOutcome { snapshot, failures }
    }

    fn run_worker<P, F>(&self, state: &Mutex<ScanState>, provider: &P, progress: Option<&F>, total: usize)
    where
        P: RecordProvider + ?Sized,
        F: Fn(ProgressInfo) + Send + Sync,
    {
        loop {
            let Some(path) = state.lock().queue.pop_front() else {
                break;
            };

            let entry = record_for(&self.root, &path, provider).map_err(|e| {
                warn!("Skipping {:?}: {}", path, e);
                ScanFailure {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            });

            let processed = {
                let mut guard = state.lock();
                match entry {
                    Ok((id, _)) if guard.snapshot.contains(&id) => {
                        warn!("Skipping {:?}: identifier {:?} already recorded", path, id.as_str());
                        guard.failures.push(ScanFailure {
                            path: path.clone(),
                            reason: format!("identifier {} collides with another file", id),
                        });
                    }
                    Ok((id, record)) => {
                        guard.snapshot.insert(id, record);
                    }
                    Err(failure) => guard.failures.push(failure),
                }
                guard.processed += 1;
                guard.processed
            };

            if let Some(callback) = progress {
                callback(ProgressInfo {
                    operation: "Hashing files".to_string(),
                    current_item: Some(path.to_string_lossy().into_owned()),
                    processed,
                    total,
                });
            }
        }
    }
}

fn record_for<P>(root: &Path, path: &Path, provider: &P) -> crate::Result<(FileId, FileRecord)>
where
    P: RecordProvider + ?Sized,
{
    let id = FileId::from_path(root, path)?;
    let record = provider.stat_and_hash(path)?;
    if record.hash.is_empty() {
        return Err(MarkError::file_access(path, "provider returned an empty hash"));
    }
    Ok((id, record))
}
