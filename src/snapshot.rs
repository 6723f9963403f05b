//! Snapshot store and its on-disk format
//!
//! A [`Snapshot`] maps each [`FileId`] to the [`FileRecord`] captured for it.
//! The map never holds two records for one identifier and iterates in
//! ascending identifier order, which keeps the persisted file reproducible.
//!
//! ## File format
//!
//! ```text
//! {
//!   "files": [
//!     { "name": "docs/readme.md", "sha": "9f86d0…", "ctime": 1700000000, "mtime": 1700000100 }
//!   ]
//! }
//! ```
//!
//! Fields are written in the order name, sha, ctime, mtime but read by name.
//! The loader also understands the older keyed layout where each file name
//! maps to an object of `sha`, `ctime` and `mtime`. Entries with missing or
//! mistyped fields are skipped one at a time; a document that is not JSON,
//! or not an object, is rejected as a whole.

use crate::error::{MarkError, Result};
use crate::types::{FileId, FileRecord};
use crate::utils;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::btree_map::{self, BTreeMap};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Mapping from file identifier to file record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: BTreeMap<FileId, FileRecord>,
}

/// A snapshot read back from disk
#[derive(Debug, Clone, Default)]
pub struct LoadedSnapshot {
    /// Entries that parsed cleanly
    pub snapshot: Snapshot,
    /// Entries that were dropped as malformed or duplicated
    pub skipped: usize,
}

#[derive(Serialize)]
struct DocumentOut<'a> {
    files: Vec<EntryOut<'a>>,
}

#[derive(Serialize)]
struct EntryOut<'a> {
    name: &'a str,
    sha: &'a str,
    ctime: u64,
    mtime: u64,
}

#[derive(Deserialize)]
struct Entry {
    name: String,
    sha: String,
    ctime: u64,
    mtime: u64,
}

#[derive(Deserialize)]
struct KeyedEntry {
    sha: String,
    ctime: u64,
    mtime: u64,
}

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, returning the one it replaced
    pub fn insert(&mut self, id: FileId, record: FileRecord) -> Option<FileRecord> {
        self.records.insert(id, record)
    }

    /// Look up the record of `id`
    pub fn get(&self, id: &FileId) -> Option<&FileRecord> {
        self.records.get(id)
    }

    /// Mutable access to the record of `id`
    pub fn get_mut(&mut self, id: &FileId) -> Option<&mut FileRecord> {
        self.records.get_mut(id)
    }

    /// Whether `id` has a record
    pub fn contains(&self, id: &FileId) -> bool {
        self.records.contains_key(id)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in ascending identifier order
    pub fn iter(&self) -> btree_map::Iter<'_, FileId, FileRecord> {
        self.records.iter()
    }

    /// Serialize to the pretty-printed JSON document
    pub fn to_json(&self) -> Result<String> {
        let document = DocumentOut {
            files: self
                .records
                .iter()
                .map(|(id, record)| EntryOut {
                    name: id.as_str(),
                    sha: &record.hash,
                    ctime: record.ctime,
                    mtime: record.mtime,
                })
                .collect(),
        };
        let mut json = serde_json::to_string_pretty(&document)?;
        json.push('\n');
        Ok(json)
    }

    /// Parse a JSON document, skipping malformed entries
    ///
    /// # Errors
    ///
    /// - [`MarkError::Json`] if the text is not JSON
    /// - [`MarkError::InvalidSnapshot`] if the top level is not an object
    pub fn from_json(text: &str) -> Result<LoadedSnapshot> {
        let document: Value = serde_json::from_str(text)?;
        let Value::Object(mut top) = document else {
            return Err(MarkError::InvalidSnapshot {
                path: Default::default(),
                reason: "top level is not an object".to_string(),
            });
        };

        let mut loaded = LoadedSnapshot::default();
        match top.remove("files") {
            Some(Value::Array(entries)) => {
                for (index, value) in entries.into_iter().enumerate() {
                    match serde_json::from_value::<Entry>(value) {
                        Ok(entry) => loaded.accept(entry.name, entry.sha, entry.ctime, entry.mtime),
                        Err(e) => {
                            warn!("Skipping snapshot entry #{}: {}", index, e);
                            loaded.skipped += 1;
                        }
                    }
                }
            }
            other => {
                if let Some(value) = other {
                    top.insert("files".to_string(), value);
                }
                for (name, value) in top {
                    match serde_json::from_value::<KeyedEntry>(value) {
                        Ok(entry) => loaded.accept(name, entry.sha, entry.ctime, entry.mtime),
                        Err(e) => {
                            warn!("Skipping snapshot entry {:?}: {}", name, e);
                            loaded.skipped += 1;
                        }
                    }
                }
            }
        }

        debug!(
            "Parsed snapshot with {} records ({} skipped)",
            loaded.snapshot.len(),
            loaded.skipped
        );
        Ok(loaded)
    }

    /// Write the snapshot to `path`, replacing any previous file atomically
    ///
    /// # Errors
    ///
    /// - [`MarkError::Persist`] if the file cannot be written durably
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        utils::atomic_write(path, json.as_bytes())?;
        debug!("Saved {} records to {:?}", self.len(), path);
        Ok(())
    }

    /// Read a snapshot from `path`
    ///
    /// Returns `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// - [`MarkError::Io`] if the file exists but cannot be read
    /// - [`MarkError::InvalidSnapshot`] if the document cannot be parsed
    pub fn load(path: &Path) -> Result<Option<LoadedSnapshot>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Self::from_json(&text)
            .map(Some)
            .map_err(|e| MarkError::InvalidSnapshot {
                path: path.to_path_buf(),
                reason: match e {
                    MarkError::InvalidSnapshot { reason, .. } => reason,
                    other => other.to_string(),
                },
            })
    }
}

impl LoadedSnapshot {
    fn accept(&mut self, name: String, sha: String, ctime: u64, mtime: u64) {
        if name.is_empty() || sha.is_empty() {
            warn!("Skipping snapshot entry {:?}: empty name or hash", name);
            self.skipped += 1;
            return;
        }
        let id = FileId::new(name);
        if self.snapshot.contains(&id) {
            warn!("Skipping duplicate snapshot entry {:?}", id.as_str());
            self.skipped += 1;
            return;
        }
        self.snapshot.insert(id, FileRecord { hash: sha, ctime, mtime });
    }
}

impl FromIterator<(FileId, FileRecord)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (FileId, FileRecord)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = (&'a FileId, &'a FileRecord);
    type IntoIter = btree_map::Iter<'a, FileId, FileRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
