//! Error types for the mark-files library
//!
//! Errors fall into two groups. Fatal kinds abort the whole run and surface
//! at the top level with a non-zero exit. Recoverable kinds are produced for a
//! single file (hashing, stat, timestamp restore) and are collected into the
//! run report instead of stopping sibling work.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the mark-files library
pub type Result<T> = std::result::Result<T, MarkError>;

/// Main error type for all mark-files operations
#[derive(Debug, Error)]
pub enum MarkError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The source directory could not be listed
    #[error("Cannot enumerate {path:?}: {reason}")]
    Enumeration {
        /// Root that was being enumerated
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Enumeration found nothing to snapshot
    #[error("No files found under {0:?}; refusing to write an empty snapshot")]
    EmptyFileSet(PathBuf),

    /// Hashing or stat of a single file failed
    #[error("Cannot read {path:?}: {reason}")]
    FileAccess {
        /// Path of the file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// A path handed to the scanner does not live under the scanned root
    #[error("Path {path:?} is outside of root {root:?}")]
    OutsideRoot {
        /// Offending path
        path: PathBuf,
        /// Scanned root
        root: PathBuf,
    },

    /// The platform cannot set the requested timestamp
    #[error("Setting the {field} time is not supported on this platform")]
    UnsupportedTimestamp {
        /// Name of the timestamp field
        field: &'static str,
    },

    /// The snapshot could not be written durably
    #[error("Cannot write snapshot {path:?}: {reason}")]
    Persist {
        /// Destination path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// The persisted snapshot is not a recognizable document
    #[error("Invalid snapshot file {path:?}: {reason}")]
    InvalidSnapshot {
        /// Path of the snapshot file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// The single-instance lock could not be taken
    #[error("Cannot acquire instance lock {name:?}: {source}")]
    Lock {
        /// Lock name
        name: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Pattern parsing error
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(String),
}

impl MarkError {
    /// Create a file access error for `path`
    pub fn file_access(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        MarkError::FileAccess {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if this error only concerns a single file
    ///
    /// Recoverable errors are recorded against one file and never abort a run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MarkError::FileAccess { .. }
                | MarkError::OutsideRoot { .. }
                | MarkError::UnsupportedTimestamp { .. }
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            MarkError::EmptyFileSet(path) => {
                format!(
                    "No files found under {:?}. Hidden and ignored files are skipped; \
                     the existing snapshot was left untouched.",
                    path
                )
            }
            MarkError::Lock { name, .. } => {
                format!(
                    "Could not take the '{}' instance lock. Check that the temporary directory is writable.",
                    name
                )
            }
            _ => self.to_string(),
        }
    }
}
