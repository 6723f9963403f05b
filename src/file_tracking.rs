//! Directory enumeration
//!
//! [`FileTracker`] lists the regular files under a root, in sorted order and
//! without duplicates, ready to be handed to the scanner. Hidden entries (any
//! path component starting with `.`) are skipped, as are files matching the
//! configured ignore patterns and explicitly excluded paths such as the
//! snapshot file itself. `.gitignore` files are not consulted: every visible
//! file's timestamps are worth preserving.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mark_files::file_tracking::FileTracker;
//! use std::path::PathBuf;
//!
//! # fn main() -> mark_files::Result<()> {
//! let files = FileTracker::new(PathBuf::from("./photos"))
//!     .with_ignore_patterns(vec!["*.tmp".to_string()])
//!     .collect_files()?;
//! println!("Found {} files", files.len());
//! # Ok(())
//! # }
//! ```

use crate::error::{MarkError, Result};
use ignore::{overrides::OverrideBuilder, WalkBuilder, WalkState};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Enumerates the files of a directory tree
#[derive(Debug, Clone)]
pub struct FileTracker {
    /// Root directory to enumerate
    root_path: PathBuf,
    /// Custom ignore patterns (gitignore syntax)
    ignore_patterns: Vec<String>,
    /// Paths never reported, compared after canonicalization
    excluded: Vec<PathBuf>,
    /// Whether to follow symbolic links during traversal
    follow_symlinks: bool,
    /// Number of walker threads
    parallel_workers: usize,
}

impl FileTracker {
    /// Create a tracker with default settings
    ///
    /// No ignore patterns, symlinks not followed, one walker thread per core.
    pub fn new(root_path: PathBuf) -> Self {
        Self {
            root_path,
            ignore_patterns: Vec::new(),
            excluded: Vec::new(),
            follow_symlinks: false,
            parallel_workers: num_cpus::get(),
        }
    }

    /// Set custom ignore patterns
    ///
    /// A leading `!` re-includes files an earlier pattern excluded.
    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Never report `path`, even when it lives under the root
    pub fn with_excluded_path(mut self, path: &Path) -> Self {
        self.excluded.push(comparable_path(path));
        self
    }

    /// Set symbolic link following behavior
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Set number of walker threads (minimum 1)
    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers.max(1);
        self
    }

    /// List all regular files under the root
    ///
    /// # Errors
    ///
    /// - [`MarkError::Enumeration`] if the root is missing or cannot be listed
    /// - [`MarkError::InvalidPattern`] if an ignore pattern does not parse
    pub fn collect_files(&self) -> Result<Vec<PathBuf>> {
        let start = Instant::now();
        let enumeration_err = |reason: String| MarkError::Enumeration {
            path: self.root_path.clone(),
            reason,
        };

        if !self.root_path.is_dir() {
            return Err(enumeration_err("not a directory".to_string()));
        }
        fs::read_dir(&self.root_path).map_err(|e| enumeration_err(e.to_string()))?;

        let mut walker_builder = WalkBuilder::new(&self.root_path);
        walker_builder
            .follow_links(self.follow_symlinks)
            .hidden(true)
            .parents(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .require_git(false)
            .threads(self.parallel_workers);

        let mut override_builder = OverrideBuilder::new(&self.root_path);
        for pattern in &self.ignore_patterns {
            // Override globs whitelist by default; a `!` prefix excludes
            let final_pattern = match pattern.strip_prefix('!') {
                Some(include) => include.to_string(),
                None => format!("!{}", pattern),
            };
            override_builder
                .add(&final_pattern)
                .map_err(|e| MarkError::InvalidPattern(format!("{}: {}", pattern, e)))?;
        }
        let overrides = override_builder
            .build()
            .map_err(|e| MarkError::InvalidPattern(e.to_string()))?;
        walker_builder.overrides(overrides);

        let collected = Arc::new(Mutex::new(Vec::<PathBuf>::new()));
        walker_builder.build_parallel().run(|| {
            let collected = Arc::clone(&collected);
            Box::new(move |entry_result| {
                match entry_result {
                    Ok(entry) => {
                        let is_file = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false);
                        if is_file {
                            collected.lock().push(entry.into_path());
                        }
                    }
                    Err(e) => warn!("Walk error: {}", e),
                }
                WalkState::Continue
            })
        });

        let mut files = std::mem::take(&mut *collected.lock());
        if !self.excluded.is_empty() {
            files.retain(|path| !self.is_excluded(path));
        }
        files.sort();
        files.dedup();

        debug!(
            "Enumerated {} files under {:?} in {:?}",
            files.len(),
            self.root_path,
            start.elapsed()
        );
        Ok(files)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let same_name = self
            .excluded
            .iter()
            .any(|excluded| excluded.file_name() == path.file_name());
        same_name && self.excluded.contains(&comparable_path(path))
    }
}

/// Canonical form of `path` for equality checks, even if it does not exist yet
fn comparable_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            parent
                .canonicalize()
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}
