//! Utility functions for mark-files
//!
//! Hashing helpers, timestamp conversions and atomic file writing shared by
//! the provider, the snapshot store and the CLI.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use crate::utils::{hash_file_content, epoch_seconds};
//! use std::path::Path;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hash = hash_file_content(Path::new("example.txt"))?;
//! let mtime = epoch_seconds(std::fs::metadata("example.txt")?.modified()?);
//! println!("{} modified at {}", hash, mtime);
//! # Ok(())
//! # }
//! ```

use crate::error::{MarkError, Result};
use chrono::{Local, TimeZone};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tracing::trace;

/// Hash a file's content using SHA-256
///
/// Reads the file in 8KB chunks and returns the digest as a 64-character
/// lowercase hexadecimal string.
///
/// # Errors
///
/// - [`MarkError::Io`] if the file cannot be opened or read
pub fn hash_file_content(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192]; // 8KB buffer

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash arbitrary data using SHA-256
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert a system time to whole seconds since the Unix epoch
///
/// Times before the epoch clamp to 0.
pub fn epoch_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Convert epoch seconds back to a system time
///
/// Returns `None` when the value does not fit the platform's time range.
pub fn system_time(seconds: u64) -> Option<SystemTime> {
    UNIX_EPOCH.checked_add(Duration::from_secs(seconds))
}

/// Format epoch seconds as local `YYYY-MM-DD HH:MM:SS`
pub fn format_timestamp(seconds: u64) -> String {
    let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
    match Local.timestamp_opt(seconds, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => seconds.to_string(),
    }
}

/// Write a file atomically
///
/// Content goes to a temporary file in the destination directory which is
/// then renamed over `path`. Readers see either the old file or the complete
/// new one; the temporary file is removed if any step fails.
///
/// # Errors
///
/// - [`MarkError::Persist`] if the temporary file cannot be created, written,
///   synced or renamed
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let persist_err = |reason: String| MarkError::Persist {
        path: path.to_path_buf(),
        reason,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| persist_err(e.to_string()))?;
    temp.write_all(content).map_err(|e| persist_err(e.to_string()))?;
    temp.as_file().sync_all().map_err(|e| persist_err(e.to_string()))?;
    temp.persist(path).map_err(|e| persist_err(e.error.to_string()))?;

    trace!("Wrote {} bytes to {:?}", content.len(), path);
    Ok(())
}
