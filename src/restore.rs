//! Applying restore actions to files on disk
//!
//! The [`Restorer`] walks a list of [`RestoreAction`]s and calls the
//! [`TimestampSetter`] once per flagged field, so a field the platform cannot
//! set never hides the other one. Failures are logged and reported; the
//! remaining files are still processed.
//!
//! Once every action has been attempted, fields that were restored are
//! written back into the fresh snapshot so the persisted file matches what is
//! now on disk. Fields that failed keep the observed value.

use crate::metadata::TimestampSetter;
use crate::snapshot::Snapshot;
use crate::types::{RestoreAction, RestoreOutcome, RestoreReport};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Applies restore actions under a root directory
pub struct Restorer<'a, S: TimestampSetter + ?Sized> {
    root: PathBuf,
    setter: &'a S,
}

impl<'a, S: TimestampSetter + ?Sized> Restorer<'a, S> {
    /// Create a restorer resolving identifiers under `root`
    pub fn new(root: PathBuf, setter: &'a S) -> Self {
        Self { root, setter }
    }

    /// Restore timestamps and update `snapshot` with the applied values
    ///
    /// The callback receives `(processed, total)` after each action.
    pub fn apply<F>(&self, actions: Vec<RestoreAction>, snapshot: &mut Snapshot, progress: Option<F>) -> RestoreReport
    where
        F: Fn(usize, usize),
    {
        let total = actions.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, action) in actions.iter().enumerate() {
            outcomes.push(self.apply_one(action));
            if let Some(callback) = &progress {
                callback(index + 1, total);
            }
        }

        for (action, outcome) in actions.iter().zip(&outcomes) {
            let Some(record) = snapshot.get_mut(&action.id) else {
                continue;
            };
            if let (true, Some(ctime)) = (outcome.ctime_restored, action.restore_ctime) {
                record.ctime = ctime;
            }
            if let (true, Some(mtime)) = (outcome.mtime_restored, action.restore_mtime) {
                record.mtime = mtime;
            }
        }

        let report = RestoreReport { actions, outcomes };
        info!(
            "Restored timestamps of {}/{} files",
            report.files_restored(),
            total
        );
        report
    }

    fn apply_one(&self, action: &RestoreAction) -> RestoreOutcome {
        let path = action.id.to_path(&self.root);
        let mut outcome = RestoreOutcome {
            id: action.id.clone(),
            ..Default::default()
        };

        if let Some(ctime) = action.restore_ctime {
            match self.setter.set_timestamps(&path, Some(ctime), None) {
                Ok(()) => outcome.ctime_restored = true,
                Err(e) => {
                    warn!("Failed to restore creation time of {:?}: {}", path, e);
                    outcome.errors.push(format!("creation time: {}", e));
                }
            }
        }

        if let Some(mtime) = action.restore_mtime {
            match self.setter.set_timestamps(&path, None, Some(mtime)) {
                Ok(()) => outcome.mtime_restored = true,
                Err(e) => {
                    warn!("Failed to restore modification time of {:?}: {}", path, e);
                    outcome.errors.push(format!("modification time: {}", e));
                }
            }
        }

        debug!(
            "{}: ctime restored={} mtime restored={}",
            action.id, outcome.ctime_restored, outcome.mtime_restored
        );
        outcome
    }
}
