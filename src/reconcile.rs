//! Reconciliation of a fresh snapshot against a saved one
//!
//! For each file present in both snapshots with an unchanged hash, the
//! creation and modification times are compared independently. Each field
//! that differs is scheduled for restoration to its saved value. Files whose
//! content changed, new files and deleted files produce nothing.
//!
//! The function is pure; the result is ordered by identifier and does not
//! depend on how either snapshot was populated.

use crate::snapshot::Snapshot;
use crate::types::RestoreAction;
use tracing::{debug, trace};

/// Compare `new` against `old` and list the timestamps to restore
///
/// # Example
///
/// ```rust
/// use mark_files::reconcile::reconcile;
/// use mark_files::snapshot::Snapshot;
/// use mark_files::types::{FileId, FileRecord};
///
/// let old: Snapshot = [(FileId::new("a"), FileRecord::new("aaa", 100, 200))].into_iter().collect();
/// let new: Snapshot = [(FileId::new("a"), FileRecord::new("aaa", 100, 250))].into_iter().collect();
///
/// let actions = reconcile(&old, &new);
/// assert_eq!(actions.len(), 1);
/// assert_eq!(actions[0].restore_ctime, None);
/// assert_eq!(actions[0].restore_mtime, Some(200));
/// ```
pub fn reconcile(old: &Snapshot, new: &Snapshot) -> Vec<RestoreAction> {
    let mut actions = Vec::new();
    let mut content_changed = 0usize;
    let mut unseen = 0usize;

    for (id, current) in new {
        let Some(saved) = old.get(id) else {
            unseen += 1;
            continue;
        };
        if saved.hash != current.hash {
            trace!("{} changed content, keeping its timestamps", id);
            content_changed += 1;
            continue;
        }

        let action = RestoreAction {
            id: id.clone(),
            restore_ctime: (saved.ctime != current.ctime).then_some(saved.ctime),
            restore_mtime: (saved.mtime != current.mtime).then_some(saved.mtime),
            current_ctime: current.ctime,
            current_mtime: current.mtime,
        };
        if !action.is_empty() {
            actions.push(action);
        }
    }

    debug!(
        "Reconciled {} files: {} drifted, {} changed content, {} new",
        new.len(),
        actions.len(),
        content_changed,
        unseen
    );
    actions
}
