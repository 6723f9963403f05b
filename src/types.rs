//! Core data types used throughout the mark-files library
//!
//! ## Overview
//!
//! - **File identity**: `FileId`, `FileRecord` - what a snapshot stores per file
//! - **Reconciliation**: `RestoreAction` - which timestamps to put back
//! - **Reporting**: `ScanFailure`, `RestoreOutcome`, `RestoreReport`, `RunReport`
//! - **Configuration**: `MarkerConfig`, `ProgressInfo`
//!
//! ## Examples
//!
//! ```rust
//! use mark_files::types::{FileId, FileRecord};
//! use std::path::Path;
//!
//! let id = FileId::from_relative(Path::new("docs/readme.md"));
//! assert_eq!(id.as_str(), "docs/readme.md");
//!
//! let record = FileRecord::new("aaa", 100, 200);
//! assert_eq!(record.mtime, 200);
//! ```

use crate::error::{MarkError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Normalized, unique key of a file inside a scanned root
///
/// The identifier is the path relative to the root, with `/` as separator and
/// UTF-8 encoding. It only changes when the file is renamed or moved.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Wrap an already normalized identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an identifier from a path relative to the root
    pub fn from_relative(relative: &Path) -> Self {
        let parts: Vec<String> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Self(parts.join("/"))
    }

    /// Build an identifier for `path`, which must live under `root`
    ///
    /// # Errors
    ///
    /// - [`MarkError::OutsideRoot`] if `path` is not below `root`
    /// - [`MarkError::FileAccess`] if the relative path is not valid UTF-8
    pub fn from_path(root: &Path, path: &Path) -> Result<Self> {
        let relative = path.strip_prefix(root).map_err(|_| MarkError::OutsideRoot {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        })?;
        if relative.to_str().is_none() {
            return Err(MarkError::file_access(path, "file name is not valid UTF-8"));
        }
        let id = Self::from_relative(relative);
        if id.0.is_empty() {
            return Err(MarkError::OutsideRoot {
                path: path.to_path_buf(),
                root: root.to_path_buf(),
            });
        }
        Ok(id)
    }

    /// Resolve the identifier back to a filesystem path under `root`
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for part in self.0.split('/').filter(|part| !part.is_empty()) {
            path.push(part);
        }
        path
    }

    /// Borrow the identifier as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one file at scan time
///
/// Timestamps are whole seconds since the Unix epoch; sub-second precision is
/// not modeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Lowercase hex digest of the file content
    pub hash: String,
    /// Creation time (inode change time where birth time is unavailable)
    pub ctime: u64,
    /// Last modification time
    pub mtime: u64,
}

impl FileRecord {
    /// Create a record from its parts
    pub fn new(hash: impl Into<String>, ctime: u64, mtime: u64) -> Self {
        Self {
            hash: hash.into(),
            ctime,
            mtime,
        }
    }
}

/// Instruction to put one or both timestamps of a file back
///
/// `None` means the field is left unchanged. The `current_*` fields carry the
/// drifted values observed by the fresh scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreAction {
    /// File the action applies to
    pub id: FileId,
    /// Creation time to restore, if it drifted
    pub restore_ctime: Option<u64>,
    /// Modification time to restore, if it drifted
    pub restore_mtime: Option<u64>,
    /// Creation time found on disk
    pub current_ctime: u64,
    /// Modification time found on disk
    pub current_mtime: u64,
}

impl RestoreAction {
    /// Whether the action changes anything at all
    pub fn is_empty(&self) -> bool {
        self.restore_ctime.is_none() && self.restore_mtime.is_none()
    }
}

/// A file the scanner could not record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    /// Path as handed to the scanner
    pub path: PathBuf,
    /// Human-readable cause
    pub reason: String,
}

/// Result of applying one `RestoreAction`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    /// File the outcome applies to
    pub id: FileId,
    /// Whether the creation time was put back
    pub ctime_restored: bool,
    /// Whether the modification time was put back
    pub mtime_restored: bool,
    /// Errors raised while restoring, one per failed field
    pub errors: Vec<String>,
}

impl RestoreOutcome {
    /// True if every requested field was restored
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Summary of a restore pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Actions that were attempted, in identifier order
    pub actions: Vec<RestoreAction>,
    /// One outcome per action, same order
    pub outcomes: Vec<RestoreOutcome>,
}

impl RestoreReport {
    /// Number of files with at least one timestamp put back
    pub fn files_restored(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.ctime_restored || o.mtime_restored)
            .count()
    }

    /// Outcomes that had at least one failure
    pub fn failures(&self) -> impl Iterator<Item = &RestoreOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// Summary of a complete run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// Files handed to the scanner
    pub files_found: usize,
    /// Records written to the snapshot
    pub files_recorded: usize,
    /// Files skipped because they could not be read
    pub scan_failures: Vec<ScanFailure>,
    /// Old snapshot entries skipped because they were malformed
    pub skipped_entries: usize,
    /// Restore pass results, present in restore mode
    pub restore: Option<RestoreReport>,
    /// Where the snapshot was written
    pub snapshot_path: PathBuf,
    /// Wall time of the run in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    /// Human-readable warnings gathered during the run
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings: Vec<String> = self
            .scan_failures
            .iter()
            .map(|f| format!("skipped {}: {}", f.path.display(), f.reason))
            .collect();
        if self.skipped_entries > 0 {
            warnings.push(format!(
                "ignored {} malformed entries in the previous snapshot",
                self.skipped_entries
            ));
        }
        if let Some(restore) = &self.restore {
            for outcome in restore.failures() {
                for error in &outcome.errors {
                    warnings.push(format!("could not restore {}: {}", outcome.id, error));
                }
            }
        }
        warnings
    }
}

/// Progress information for long-running operations
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Current operation name
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Number of items processed
    pub processed: usize,
    /// Total number of items
    pub total: usize,
}

/// Configuration of a mark-files run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkerConfig {
    /// Directory to snapshot
    pub root_path: PathBuf,
    /// Snapshot file to read (restore mode) and write
    pub snapshot_path: PathBuf,
    /// Upper bound on scanner threads
    pub parallel_workers: usize,
    /// Additional ignore patterns (gitignore syntax)
    pub ignore_patterns: Vec<String>,
    /// Whether to follow symbolic links while enumerating
    pub follow_symlinks: bool,
    /// Name of the cross-process instance lock
    pub lock_name: String,
}
