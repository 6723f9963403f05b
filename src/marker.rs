//! Run orchestration
//!
//! [`Marker`] ties the pieces together for one run:
//!
//! 1. take the cross-process instance lock
//! 2. in restore mode, load the previous snapshot
//! 3. enumerate the files under the root
//! 4. hash and stat them with the worker pool
//! 5. in restore mode, reconcile and restore
//! 6. persist the new snapshot atomically
//!
//! The lock is held from step 1 until the run returns, on success or error.
//! An empty file set aborts the run before anything is written, so a stray
//! run against the wrong directory cannot wipe an existing baseline.

use crate::error::{MarkError, Result};
use crate::file_tracking::FileTracker;
use crate::lock::{InstanceLock, DEFAULT_LOCK_NAME};
use crate::metadata::{FsRecordProvider, FsTimestampSetter, RecordProvider, TimestampSetter};
use crate::reconcile::reconcile;
use crate::restore::Restorer;
use crate::scanner::{ScanOutcome, SnapshotScanner};
use crate::snapshot::{LoadedSnapshot, Snapshot};
use crate::types::{MarkerConfig, ProgressInfo, RunReport};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// Snapshots a directory and restores drifted timestamps
pub struct Marker {
    config: MarkerConfig,
    provider: Box<dyn RecordProvider>,
    setter: Box<dyn TimestampSetter>,
}

impl Marker {
    /// Create a marker with default settings
    ///
    /// # Errors
    ///
    /// - [`MarkError::InvalidConfiguration`] if the snapshot path is unusable
    pub fn new(root_path: PathBuf, snapshot_path: PathBuf) -> Result<Self> {
        MarkerBuilder::new().build(root_path, snapshot_path)
    }

    /// Replace the hash/stat provider
    pub fn with_provider(mut self, provider: impl RecordProvider + 'static) -> Self {
        self.provider = Box::new(provider);
        self
    }

    /// Replace the timestamp-set primitive
    pub fn with_timestamp_setter(mut self, setter: impl TimestampSetter + 'static) -> Self {
        self.setter = Box::new(setter);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &MarkerConfig {
        &self.config
    }

    /// Record a fresh snapshot, replacing the saved one
    pub fn snapshot<F>(&self, progress: Option<F>) -> Result<RunReport>
    where
        F: Fn(ProgressInfo) + Send + Sync,
    {
        self.run(false, progress)
    }

    /// Restore drifted timestamps, then record a fresh snapshot
    pub fn restore<F>(&self, progress: Option<F>) -> Result<RunReport>
    where
        F: Fn(ProgressInfo) + Send + Sync,
    {
        self.run(true, progress)
    }

    /// Run a full cycle, restoring timestamps first when `restore` is set
    pub fn run<F>(&self, restore: bool, progress: Option<F>) -> Result<RunReport>
    where
        F: Fn(ProgressInfo) + Send + Sync,
    {
        let start = Instant::now();
        let _lock = InstanceLock::acquire(&self.config.lock_name)?;

        // A corrupt baseline fails the run before any file is hashed
        let baseline = if restore {
            Some(match Snapshot::load(&self.config.snapshot_path)? {
                Some(loaded) => loaded,
                None => {
                    warn!(
                        "No previous snapshot at {:?}; nothing to restore",
                        self.config.snapshot_path
                    );
                    LoadedSnapshot::default()
                }
            })
        } else {
            None
        };

        info!(
            "Scanning {:?} (restore: {})",
            self.config.root_path, restore
        );
        let (files_found, outcome) = self.scan_files(progress.as_ref())?;
        let ScanOutcome {
            mut snapshot,
            failures,
        } = outcome;

        let mut report = RunReport {
            files_found,
            scan_failures: failures,
            snapshot_path: self.config.snapshot_path.clone(),
            ..Default::default()
        };

        if let Some(LoadedSnapshot { snapshot: old, skipped }) = baseline {
            report.skipped_entries = skipped;

            let actions = reconcile(&old, &snapshot);
            info!("{} files have drifted timestamps", actions.len());

            let restorer = Restorer::new(self.config.root_path.clone(), self.setter.as_ref());
            let restore_progress = |processed: usize, total: usize| {
                if let Some(callback) = &progress {
                    callback(ProgressInfo {
                        operation: "Restoring timestamps".to_string(),
                        current_item: None,
                        processed,
                        total,
                    });
                }
            };
            report.restore = Some(restorer.apply(actions, &mut snapshot, Some(restore_progress)));
        }

        snapshot.save(&self.config.snapshot_path)?;
        report.files_recorded = snapshot.len();
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Wrote {} records to {:?} in {}ms",
            report.files_recorded, self.config.snapshot_path, report.duration_ms
        );
        Ok(report)
    }

    /// Enumerate and hash the tree without touching the snapshot file
    ///
    /// Returns the number of files found and the scan outcome.
    ///
    /// # Errors
    ///
    /// - [`MarkError::Enumeration`] if the root cannot be listed
    /// - [`MarkError::EmptyFileSet`] if no file could be recorded
    pub fn scan_files<F>(&self, progress: Option<F>) -> Result<(usize, ScanOutcome)>
    where
        F: Fn(ProgressInfo) + Send + Sync,
    {
        let files = FileTracker::new(self.config.root_path.clone())
            .with_ignore_patterns(self.config.ignore_patterns.clone())
            .with_follow_symlinks(self.config.follow_symlinks)
            .with_parallel_workers(self.config.parallel_workers)
            .with_excluded_path(&self.config.snapshot_path)
            .collect_files()?;
        if files.is_empty() {
            return Err(MarkError::EmptyFileSet(self.config.root_path.clone()));
        }

        let files_found = files.len();
        let outcome = SnapshotScanner::new(self.config.root_path.clone())
            .with_max_workers(self.config.parallel_workers)
            .scan(files, self.provider.as_ref(), progress);

        if outcome.snapshot.is_empty() {
            return Err(MarkError::EmptyFileSet(self.config.root_path.clone()));
        }
        Ok((files_found, outcome))
    }
}

/// Builder for configuring a [`Marker`]
///
/// # Examples
///
/// ```rust,no_run
/// use mark_files::MarkerBuilder;
/// use std::path::PathBuf;
///
/// # fn main() -> mark_files::Result<()> {
/// let marker = MarkerBuilder::new()
///     .parallel_workers(4)
///     .ignore_patterns(vec!["*.tmp".to_string()])
///     .build(PathBuf::from("./photos"), PathBuf::from("./photos.json"))?;
/// let report = marker.restore(None::<fn(mark_files::ProgressInfo)>)?;
/// println!("{} files recorded", report.files_recorded);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MarkerBuilder {
    parallel_workers: usize,
    ignore_patterns: Vec<String>,
    follow_symlinks: bool,
    lock_name: String,
}

impl MarkerBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            parallel_workers: num_cpus::get(),
            ignore_patterns: Vec::new(),
            follow_symlinks: false,
            lock_name: DEFAULT_LOCK_NAME.to_string(),
        }
    }

    /// Set the maximum number of worker threads (minimum 1)
    pub fn parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers.max(1);
        self
    }

    /// Set ignore patterns (gitignore syntax)
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Set whether to follow symbolic links
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Set the name of the cross-process instance lock
    pub fn lock_name(mut self, name: impl Into<String>) -> Self {
        self.lock_name = name.into();
        self
    }

    /// Build the marker
    ///
    /// # Errors
    ///
    /// - [`MarkError::InvalidConfiguration`] if the snapshot path is empty or
    ///   a directory, or the lock name is empty
    pub fn build(self, root_path: PathBuf, snapshot_path: PathBuf) -> Result<Marker> {
        if snapshot_path.as_os_str().is_empty() {
            return Err(MarkError::InvalidConfiguration(
                "snapshot path is empty".to_string(),
            ));
        }
        if snapshot_path.is_dir() {
            return Err(MarkError::InvalidConfiguration(format!(
                "snapshot path {:?} is a directory",
                snapshot_path
            )));
        }
        if self.lock_name.trim().is_empty() {
            return Err(MarkError::InvalidConfiguration(
                "lock name is empty".to_string(),
            ));
        }

        Ok(Marker {
            config: MarkerConfig {
                root_path,
                snapshot_path,
                parallel_workers: self.parallel_workers,
                ignore_patterns: self.ignore_patterns,
                follow_symlinks: self.follow_symlinks,
                lock_name: self.lock_name,
            },
            provider: Box::new(FsRecordProvider),
            setter: Box::new(FsTimestampSetter),
        })
    }
}

impl Default for MarkerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
