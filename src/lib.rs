//! # mark-files - keep file timestamps honest
//!
//! mark-files records the identity of every file in a directory tree (a
//! SHA-256 content hash plus creation and modification times) and, on a later
//! run, puts back the timestamps of files whose content did not change.
//! Tools that copy, sync or re-save files often bump timestamps without
//! touching the bytes; this undoes that drift.
//!
//! File content is never modified. Only timestamps and the side-channel
//! snapshot file are written.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mark_files::{Marker, ProgressInfo};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let marker = Marker::new(PathBuf::from("./photos"), PathBuf::from("./photos.json"))?;
//!
//! // First run: record the baseline
//! marker.snapshot(None::<fn(ProgressInfo)>)?;
//!
//! // Later: restore drifted timestamps and refresh the baseline
//! let report = marker.restore(None::<fn(ProgressInfo)>)?;
//! if let Some(restore) = &report.restore {
//!     println!("Restored {} files", restore.files_restored());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Enumeration** ([`file_tracking`]): lists visible regular files under the root
//! - **Worker pool** ([`scanner`]): hashes and stats files on parallel threads,
//!   sharing one queue and one result map under a single lock
//! - **Snapshot store** ([`snapshot`]): ordered map of records and its JSON format
//! - **Reconciler** ([`reconcile`]): pure comparison of an old and a new snapshot
//! - **Restorer** ([`restore`]): applies the resulting timestamp restorations
//! - **Instance lock** ([`lock`]): keeps two runs from interleaving
//!
//! ## Error Handling
//!
//! All operations return `Result<T, MarkError>`. Problems with a single file
//! (unreadable, timestamp not settable) are collected into the [`RunReport`]
//! and never abort a run; enumeration, empty file sets and persistence
//! failures do.

// Public API modules
pub mod error;
pub mod file_tracking;
pub mod lock;
pub mod marker;
pub mod metadata;
pub mod reconcile;
pub mod restore;
pub mod scanner;
pub mod snapshot;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use error::{MarkError, Result};
pub use marker::{Marker, MarkerBuilder};
pub use metadata::{FsRecordProvider, FsTimestampSetter, RecordProvider, TimestampSetter};
pub use snapshot::Snapshot;
pub use types::*;
