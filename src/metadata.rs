//! Reading and writing file identity metadata
//!
//! Two seams sit here. [`RecordProvider`] turns a path into a [`FileRecord`]
//! (content hash plus timestamps) and is what the scanner calls from its
//! workers. [`TimestampSetter`] puts timestamps back and is what the restorer
//! calls. The filesystem implementations are the defaults; tests swap in
//! in-memory ones.
//!
//! ## Creation time
//!
//! `ctime` is the birth time where the platform reports one. On Unix
//! filesystems without birth time it falls back to the inode change time.
//! Only Windows can set the creation time; elsewhere a ctime restore fails
//! with [`MarkError::UnsupportedTimestamp`] and the mtime is still handled.

use crate::error::{MarkError, Result};
use crate::types::FileRecord;
use crate::utils;
use std::fs;
use std::path::Path;
use tracing::trace;

/// Computes the identity of a single file
///
/// Implementations must be callable from several worker threads at once.
pub trait RecordProvider: Send + Sync {
    /// Hash the file content and read its creation/modification times
    fn stat_and_hash(&self, path: &Path) -> Result<FileRecord>;
}

/// Sets file timestamps
///
/// `None` leaves the corresponding timestamp untouched; it is never read as
/// epoch zero.
pub trait TimestampSetter: Send + Sync {
    /// Apply the given creation and modification times to `path`
    fn set_timestamps(&self, path: &Path, ctime: Option<u64>, mtime: Option<u64>) -> Result<()>;
}

impl<F> RecordProvider for F
where
    F: Fn(&Path) -> Result<FileRecord> + Send + Sync,
{
    fn stat_and_hash(&self, path: &Path) -> Result<FileRecord> {
        self(path)
    }
}

/// SHA-256 provider backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsRecordProvider;

impl RecordProvider for FsRecordProvider {
    fn stat_and_hash(&self, path: &Path) -> Result<FileRecord> {
        let metadata = fs::metadata(path).map_err(|e| MarkError::file_access(path, e))?;
        if !metadata.is_file() {
            return Err(MarkError::file_access(path, "not a regular file"));
        }

        let hash = utils::hash_file_content(path).map_err(|e| MarkError::file_access(path, e))?;
        let mtime = metadata
            .modified()
            .map(utils::epoch_seconds)
            .map_err(|e| MarkError::file_access(path, e))?;
        let ctime = creation_seconds(&metadata).map_err(|e| MarkError::file_access(path, e))?;

        trace!("Recorded {:?}: ctime={} mtime={}", path, ctime, mtime);
        Ok(FileRecord { hash, ctime, mtime })
    }
}

#[cfg(unix)]
fn creation_seconds(metadata: &fs::Metadata) -> std::io::Result<u64> {
    use std::os::unix::fs::MetadataExt;

    match metadata.created() {
        Ok(created) => Ok(utils::epoch_seconds(created)),
        Err(_) => Ok(u64::try_from(metadata.ctime()).unwrap_or(0)),
    }
}

#[cfg(not(unix))]
fn creation_seconds(metadata: &fs::Metadata) -> std::io::Result<u64> {
    metadata.created().map(utils::epoch_seconds)
}

/// Timestamp setter backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsTimestampSetter;

impl TimestampSetter for FsTimestampSetter {
    fn set_timestamps(&self, path: &Path, ctime: Option<u64>, mtime: Option<u64>) -> Result<()> {
        if let Some(mtime) = mtime {
            let time = filetime::FileTime::from_system_time(time_at(path, mtime)?);
            filetime::set_file_mtime(path, time).map_err(|e| MarkError::file_access(path, e))?;
        }
        if let Some(ctime) = ctime {
            set_creation_time(path, ctime)?;
        }
        Ok(())
    }
}

fn time_at(path: &Path, seconds: u64) -> Result<std::time::SystemTime> {
    utils::system_time(seconds).ok_or_else(|| MarkError::file_access(path, "timestamp out of range"))
}

#[cfg(windows)]
fn set_creation_time(path: &Path, ctime: u64) -> Result<()> {
    use std::fs::{FileTimes, OpenOptions};
    use std::os::windows::fs::FileTimesExt;

    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| MarkError::file_access(path, e))?;
    let times = FileTimes::new().set_created(time_at(path, ctime)?);
    file.set_times(times).map_err(|e| MarkError::file_access(path, e))
}

#[cfg(not(windows))]
fn set_creation_time(_path: &Path, _ctime: u64) -> Result<()> {
    Err(MarkError::UnsupportedTimestamp { field: "creation" })
}
