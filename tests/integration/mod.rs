//! Integration tests for full mark-files runs
//!
//! Covers the drift scenario end to end, both with scripted metadata (so exact
//! ctime/mtime values can be asserted) and against the real filesystem.

use ::mark_files::utils::hash_data;
use ::mark_files::*;
use filetime::{set_file_mtime, FileTime};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use tracing::info;

/// Provider returning scripted records keyed by file name
#[derive(Clone, Default)]
pub struct ScriptedFs {
    records: Arc<Mutex<HashMap<String, FileRecord>>>,
}

impl ScriptedFs {
    pub fn set(&self, name: &str, hash: &str, ctime: u64, mtime: u64) {
        self.records
            .lock()
            .insert(name.to_string(), FileRecord::new(hash, ctime, mtime));
    }
}

impl RecordProvider for ScriptedFs {
    fn stat_and_hash(&self, path: &Path) -> Result<FileRecord> {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.records
            .lock()
            .get(&name)
            .cloned()
            .ok_or_else(|| MarkError::file_access(path, "not scripted"))
    }
}

/// Setter that records calls and writes them back into a `ScriptedFs`
#[derive(Clone, Default)]
pub struct ScriptedSetter {
    fs: ScriptedFs,
    pub calls: Arc<Mutex<Vec<(PathBuf, Option<u64>, Option<u64>)>>>,
}

impl TimestampSetter for ScriptedSetter {
    fn set_timestamps(&self, path: &Path, ctime: Option<u64>, mtime: Option<u64>) -> Result<()> {
        self.calls.lock().push((path.to_path_buf(), ctime, mtime));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let mut records = self.fs.records.lock();
        let record = records
            .get_mut(&name)
            .ok_or_else(|| MarkError::file_access(path, "not scripted"))?;
        if let Some(ctime) = ctime {
            record.ctime = ctime;
        }
        if let Some(mtime) = mtime {
            record.mtime = mtime;
        }
        Ok(())
    }
}

/// Test harness for snapshot/restore scenarios
pub struct MarkTestHarness {
    pub root_dir: TempDir,
    pub state_dir: TempDir,
    pub fs: ScriptedFs,
    pub setter: ScriptedSetter,
    lock_name: String,
}

impl MarkTestHarness {
    pub fn new(lock_name: &str) -> Self {
        let fs = ScriptedFs::default();
        let setter = ScriptedSetter {
            fs: fs.clone(),
            calls: Arc::default(),
        };
        Self {
            root_dir: TempDir::new().unwrap(),
            state_dir: TempDir::new().unwrap(),
            fs,
            setter,
            lock_name: lock_name.to_string(),
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.path().join("snapshot.json")
    }

    /// Create the file on disk and script its metadata
    pub fn create(&self, name: &str, hash: &str, ctime: u64, mtime: u64) {
        fs::write(self.root_dir.path().join(name), name).unwrap();
        self.fs.set(name, hash, ctime, mtime);
    }

    pub fn delete(&self, name: &str) {
        fs::remove_file(self.root_dir.path().join(name)).unwrap();
    }

    pub fn marker(&self) -> Marker {
        MarkerBuilder::new()
            .lock_name(self.lock_name.clone())
            .parallel_workers(4)
            .build(self.root_dir.path().to_path_buf(), self.snapshot_path())
            .unwrap()
            .with_provider(self.fs.clone())
            .with_timestamp_setter(self.setter.clone())
    }

    pub fn saved(&self) -> Snapshot {
        Snapshot::load(&self.snapshot_path()).unwrap().unwrap().snapshot
    }
}

#[test]
fn test_drift_scenario_with_scripted_metadata() {
    let harness = MarkTestHarness::new("mark-files-it-scenario");
    harness.create("A", "aaa", 100, 200);
    harness.create("B", "bbb", 300, 300);

    harness.marker().snapshot(None::<fn(ProgressInfo)>).unwrap();
    let v1 = harness.saved();
    assert_eq!(v1.len(), 2);

    // A drifts, B disappears, C shows up
    harness.fs.set("A", "aaa", 100, 250);
    harness.delete("B");
    harness.create("C", "ccc", 500, 600);

    let report = harness.marker().restore(None::<fn(ProgressInfo)>).unwrap();
    let restore = report.restore.as_ref().unwrap();

    assert_eq!(restore.actions.len(), 1);
    let action = &restore.actions[0];
    assert_eq!(action.id, FileId::new("A"));
    assert_eq!(action.restore_ctime, None);
    assert_eq!(action.restore_mtime, Some(200));
    assert_eq!(action.current_mtime, 250);

    let calls = harness.setter.calls.lock().clone();
    assert_eq!(calls, vec![(harness.root_dir.path().join("A"), None, Some(200))]);

    let v2 = harness.saved();
    assert_eq!(v2.len(), 2);
    assert_eq!(v2.get(&FileId::new("A")), Some(&FileRecord::new("aaa", 100, 200)));
    assert_eq!(v2.get(&FileId::new("C")), Some(&FileRecord::new("ccc", 500, 600)));
    assert!(!v2.contains(&FileId::new("B")));
    info!("Scenario report: {:?}", report);
}

#[test]
fn test_changed_content_keeps_new_timestamps() {
    let harness = MarkTestHarness::new("mark-files-it-changed");
    harness.create("doc", "v1", 100, 200);
    harness.marker().snapshot(None::<fn(ProgressInfo)>).unwrap();

    harness.fs.set("doc", "v2", 100, 900);
    let report = harness.marker().restore(None::<fn(ProgressInfo)>).unwrap();

    assert!(report.restore.unwrap().actions.is_empty());
    assert!(harness.setter.calls.lock().is_empty());
    assert_eq!(harness.saved().get(&FileId::new("doc")), Some(&FileRecord::new("v2", 100, 900)));
}

#[test]
fn test_ctime_only_drift_restores_ctime_only() {
    let harness = MarkTestHarness::new("mark-files-it-ctime");
    harness.create("photo", "ppp", 100, 200);
    harness.marker().snapshot(None::<fn(ProgressInfo)>).unwrap();

    harness.fs.set("photo", "ppp", 150, 200);
    let report = harness.marker().restore(None::<fn(ProgressInfo)>).unwrap();

    let restore = report.restore.unwrap();
    assert_eq!(restore.actions[0].restore_ctime, Some(100));
    assert_eq!(restore.actions[0].restore_mtime, None);
    assert!(restore.outcomes[0].ctime_restored);
    assert!(!restore.outcomes[0].mtime_restored);

    let calls = harness.setter.calls.lock().clone();
    assert_eq!(calls, vec![(harness.root_dir.path().join("photo"), Some(100), None)]);
    assert_eq!(harness.saved().get(&FileId::new("photo")), Some(&FileRecord::new("ppp", 100, 200)));
}

#[test]
fn test_unreadable_file_is_skipped_with_warning() {
    let harness = MarkTestHarness::new("mark-files-it-unreadable");
    harness.create("good", "ggg", 1, 2);
    // On disk but unknown to the provider
    fs::write(harness.root_dir.path().join("bad"), "x").unwrap();

    let report = harness.marker().snapshot(None::<fn(ProgressInfo)>).unwrap();
    assert_eq!(report.files_found, 2);
    assert_eq!(report.files_recorded, 1);
    assert_eq!(report.scan_failures.len(), 1);
    assert!(report.warnings()[0].contains("bad"));
}

#[test]
fn test_missing_baseline_restores_nothing() {
    let harness = MarkTestHarness::new("mark-files-it-nobaseline");
    harness.create("a", "aaa", 1, 2);

    let report = harness.marker().restore(None::<fn(ProgressInfo)>).unwrap();
    assert!(report.restore.unwrap().actions.is_empty());
    assert_eq!(harness.saved().len(), 1);
}

#[test]
fn test_malformed_baseline_entries_are_skipped() {
    let harness = MarkTestHarness::new("mark-files-it-malformed");
    harness.create("a", "aaa", 1, 2);
    harness.create("b", "bbb", 3, 4);
    fs::write(
        harness.snapshot_path(),
        r#"{ "files": [
            { "name": "a", "sha": "aaa", "ctime": 1, "mtime": 1 },
            { "name": "b", "sha": "bbb" }
        ] }"#,
    )
    .unwrap();

    let report = harness.marker().restore(None::<fn(ProgressInfo)>).unwrap();
    assert_eq!(report.skipped_entries, 1);
    let restore = report.restore.unwrap();
    assert_eq!(restore.actions.len(), 1);
    assert_eq!(restore.actions[0].id, FileId::new("a"));
    assert_eq!(restore.actions[0].restore_mtime, Some(1));
}

/// Provider that parks its first call until released
#[derive(Clone)]
struct GatedFs {
    inner: ScriptedFs,
    entered: mpsc::SyncSender<()>,
    release: Arc<Mutex<Option<mpsc::Receiver<()>>>>,
}

impl RecordProvider for GatedFs {
    fn stat_and_hash(&self, path: &Path) -> Result<FileRecord> {
        let gate = self.release.lock().take();
        if let Some(release) = gate {
            self.entered.send(()).ok();
            release.recv().ok();
        }
        self.inner.stat_and_hash(path)
    }
}

#[test]
fn test_second_run_waits_for_the_instance_lock() {
    let harness = Arc::new(MarkTestHarness::new("mark-files-it-concurrent"));
    harness.create("only", "ooo", 1, 2);

    let (entered_tx, entered_rx) = mpsc::sync_channel(1);
    let (release_tx, release_rx) = mpsc::channel();
    let gated = GatedFs {
        inner: harness.fs.clone(),
        entered: entered_tx,
        release: Arc::new(Mutex::new(Some(release_rx))),
    };

    let first = {
        let harness = Arc::clone(&harness);
        thread::spawn(move || {
            harness
                .marker()
                .with_provider(gated)
                .snapshot(None::<fn(ProgressInfo)>)
                .unwrap()
        })
    };
    // First run holds the lock and is parked mid-scan
    entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let second = {
        let harness = Arc::clone(&harness);
        thread::spawn(move || {
            let report = harness.marker().restore(None::<fn(ProgressInfo)>).unwrap();
            done_tx.send(()).unwrap();
            report
        })
    };

    assert_eq!(
        done_rx.recv_timeout(Duration::from_millis(500)),
        Err(mpsc::RecvTimeoutError::Timeout),
        "second run finished while the first still held the lock"
    );
    assert!(!harness.snapshot_path().exists());

    release_tx.send(()).unwrap();
    let first_report = first.join().unwrap();
    done_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    let second_report = second.join().unwrap();

    assert_eq!(first_report.files_recorded, 1);
    // The second run saw the baseline the first one persisted
    assert_eq!(second_report.skipped_entries, 0);
    assert!(second_report.restore.unwrap().actions.is_empty());
    assert_eq!(harness.saved().len(), 1);
}

#[test]
fn test_out_of_range_baseline_time_is_a_file_warning() {
    let root_dir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let snapshot_path = state_dir.path().join("snapshot.json");
    let root = root_dir.path();

    fs::write(root.join("huge"), "huge").unwrap();
    fs::write(root.join("normal"), "normal").unwrap();
    set_file_mtime(root.join("normal"), FileTime::from_unix_time(5_000, 0)).unwrap();

    let huge = FsRecordProvider.stat_and_hash(&root.join("huge")).unwrap();
    let normal = FsRecordProvider.stat_and_hash(&root.join("normal")).unwrap();
    let baseline: Snapshot = [
        (FileId::new("huge"), FileRecord::new(huge.hash.clone(), huge.ctime, u64::MAX)),
        (FileId::new("normal"), FileRecord::new(normal.hash.clone(), normal.ctime, 4_000)),
    ]
    .into_iter()
    .collect();
    baseline.save(&snapshot_path).unwrap();

    let report = MarkerBuilder::new()
        .lock_name("mark-files-it-out-of-range")
        .build(root.to_path_buf(), snapshot_path.clone())
        .unwrap()
        .restore(None::<fn(ProgressInfo)>)
        .unwrap();

    let restore = report.restore.as_ref().unwrap();
    let outcome = |id: &str| restore.outcomes.iter().find(|o| o.id == FileId::new(id)).unwrap();
    assert!(!outcome("huge").mtime_restored);
    assert!(outcome("huge").errors.iter().any(|e| e.contains("out of range")));
    assert!(outcome("normal").mtime_restored);
    assert!(report.warnings().iter().any(|w| w.contains("huge")));

    let mtime = FileTime::from_last_modification_time(&fs::metadata(root.join("normal")).unwrap());
    assert_eq!(mtime.unix_seconds(), 4_000);

    let saved = Snapshot::load(&snapshot_path).unwrap().unwrap().snapshot;
    assert_eq!(saved.get(&FileId::new("huge")).unwrap().mtime, huge.mtime);
    assert_eq!(saved.get(&FileId::new("normal")).unwrap().mtime, 4_000);
}

#[test]
fn test_real_filesystem_mtime_drift() {
    let root_dir = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let snapshot_path = state_dir.path().join("snapshot.json");
    let root = root_dir.path();

    fs::write(root.join("A"), "alpha").unwrap();
    fs::write(root.join("B"), "beta").unwrap();
    set_file_mtime(root.join("A"), FileTime::from_unix_time(200, 0)).unwrap();

    let marker = MarkerBuilder::new()
        .lock_name("mark-files-it-realfs")
        .build(root.to_path_buf(), snapshot_path.clone())
        .unwrap();
    marker.snapshot(None::<fn(ProgressInfo)>).unwrap();

    set_file_mtime(root.join("A"), FileTime::from_unix_time(250, 0)).unwrap();
    fs::remove_file(root.join("B")).unwrap();
    fs::write(root.join("C"), "gamma").unwrap();

    let report = marker.restore(None::<fn(ProgressInfo)>).unwrap();
    let restore = report.restore.as_ref().unwrap();
    let a_action = restore.actions.iter().find(|a| a.id == FileId::new("A")).unwrap();
    assert_eq!(a_action.restore_mtime, Some(200));
    assert!(restore.actions.iter().all(|a| a.id != FileId::new("B") && a.id != FileId::new("C")));

    let mtime = FileTime::from_last_modification_time(&fs::metadata(root.join("A")).unwrap());
    assert_eq!(mtime.unix_seconds(), 200);

    let saved = Snapshot::load(&snapshot_path).unwrap().unwrap().snapshot;
    assert_eq!(saved.len(), 2);
    assert_eq!(saved.get(&FileId::new("A")).unwrap().mtime, 200);
    assert_eq!(saved.get(&FileId::new("A")).unwrap().hash, hash_data(b"alpha"));
    assert!(saved.contains(&FileId::new("C")));
    assert!(!saved.contains(&FileId::new("B")));
}

#[test]
fn test_rescan_after_persist_is_idempotent() -> anyhow::Result<()> {
    let root_dir = TempDir::new()?;
    let state_dir = TempDir::new()?;
    for i in 0..10 {
        fs::write(root_dir.path().join(format!("file{}.txt", i)), format!("content {}", i))?;
    }

    let marker = MarkerBuilder::new()
        .lock_name("mark-files-it-idempotent")
        .build(root_dir.path().to_path_buf(), state_dir.path().join("snapshot.json"))?;
    marker.snapshot(None::<fn(ProgressInfo)>)?;

    let saved = Snapshot::load(&marker.config().snapshot_path)?
        .ok_or_else(|| anyhow::anyhow!("snapshot was not written"))?;
    let (_, rescan) = marker.scan_files(None::<fn(ProgressInfo)>)?;
    assert!(reconcile::reconcile(&saved.snapshot, &rescan.snapshot).is_empty());
    assert_eq!(saved.snapshot, rescan.snapshot);
    Ok(())
}
