use chrono::{DateTime, Utc};
use diskstrata_core::{FolderNode, NewFolderNode, NodeId, Scan, ScanId, ScanStatus, Settings};
use diskstrata_scan::{
    EngineError, FileEntry, FileSystem, ScanEngine, ScanEvent, WarningKind, recover_stale_scans,
};
use diskstrata_store::{MemoryStore, SnapshotStore, SqliteStore, StoreError, StoreResult};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// Scripted in-memory directory tree.
#[derive(Default)]
struct FakeFs {
    files: HashMap<PathBuf, Vec<(PathBuf, Result<u64, io::ErrorKind>)>>,
    dirs: HashMap<PathBuf, Vec<PathBuf>>,
    file_errors: HashMap<PathBuf, io::ErrorKind>,
    subdir_errors: HashMap<PathBuf, io::ErrorKind>,
    gate: Option<Gate>,
}

/// Blocks `list_files` on one path until the test releases it.
struct Gate {
    path: PathBuf,
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl FakeFs {
    fn dir(mut self, path: &str) -> Self {
        self.ensure_dir(Path::new(path));
        self
    }

    fn file(mut self, path: &str, size: u64) -> Self {
        self.add_file(Path::new(path), Ok(size));
        self
    }

    fn unreadable_file(mut self, path: &str) -> Self {
        self.add_file(Path::new(path), Err(io::ErrorKind::PermissionDenied));
        self
    }

    fn deny(mut self, path: &str) -> Self {
        self.ensure_dir(Path::new(path));
        self.file_errors
            .insert(PathBuf::from(path), io::ErrorKind::PermissionDenied);
        self.subdir_errors
            .insert(PathBuf::from(path), io::ErrorKind::PermissionDenied);
        self
    }

    fn broken_files(mut self, path: &str) -> Self {
        self.ensure_dir(Path::new(path));
        self.file_errors
            .insert(PathBuf::from(path), io::ErrorKind::Other);
        self
    }

    fn broken_subdirs(mut self, path: &str) -> Self {
        self.ensure_dir(Path::new(path));
        self.subdir_errors
            .insert(PathBuf::from(path), io::ErrorKind::Other);
        self
    }

    /// List `path` a second time under its parent.
    fn listed_twice(mut self, path: &str) -> Self {
        let path = PathBuf::from(path);
        self.ensure_dir(&path);
        if let Some(siblings) = path.parent().and_then(|p| self.dirs.get_mut(p)) {
            siblings.push(path.clone());
        }
        self
    }

    fn gated(mut self, path: &str) -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        self.gate = Some(Gate {
            path: PathBuf::from(path),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        (self, entered_rx, release_tx)
    }

    fn ensure_dir(&mut self, path: &Path) {
        if self.dirs.contains_key(path) {
            return;
        }
        self.dirs.insert(path.to_path_buf(), Vec::new());
        self.files.entry(path.to_path_buf()).or_default();
        if let Some(parent) = path.parent() {
            self.ensure_dir(parent);
            if let Some(siblings) = self.dirs.get_mut(parent) {
                siblings.push(path.to_path_buf());
            }
        }
    }

    fn add_file(&mut self, path: &Path, size: Result<u64, io::ErrorKind>) {
        let parent = path.parent().unwrap();
        self.ensure_dir(parent);
        self.files
            .get_mut(parent)
            .unwrap()
            .push((path.to_path_buf(), size));
    }

    /// Bytes of the readable files directly in `dir`.
    fn own_bytes(&self, dir: &Path) -> u64 {
        if self.file_errors.contains_key(dir) {
            return 0;
        }
        self.files
            .get(dir)
            .map(|files| files.iter().filter_map(|(_, size)| size.ok()).sum())
            .unwrap_or(0)
    }
}

impl FileSystem for FakeFs {
    fn list_files(&self, dir: &Path) -> io::Result<Vec<FileEntry>> {
        if let Some(gate) = self.gate.as_ref().filter(|g| g.path == dir) {
            let _ = gate.entered.lock().unwrap().send(());
            let _ = gate.release.lock().unwrap().recv();
        }
        if let Some(kind) = self.file_errors.get(dir) {
            return Err(io::Error::from(*kind));
        }
        let files = self
            .files
            .get(dir)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        Ok(files
            .iter()
            .map(|(path, size)| FileEntry {
                path: path.clone(),
                size: (*size).map_err(io::Error::from),
            })
            .collect())
    }

    fn list_subdirs(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        if let Some(kind) = self.subdir_errors.get(dir) {
            return Err(io::Error::from(*kind));
        }
        self.dirs
            .get(dir)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

/// Store that starts rejecting node inserts after a fixed number.
struct FlakyStore {
    inner: MemoryStore,
    allowed_nodes: usize,
    added: AtomicUsize,
}

impl FlakyStore {
    fn new(allowed_nodes: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            allowed_nodes,
            added: AtomicUsize::new(0),
        }
    }
}

impl SnapshotStore for FlakyStore {
    fn create_scan(&self, start_time: DateTime<Utc>, status: ScanStatus) -> StoreResult<Scan> {
        self.inner.create_scan(start_time, status)
    }
    fn update_scan(&self, scan: &Scan) -> StoreResult<()> {
        self.inner.update_scan(scan)
    }
    fn delete_scan(&self, id: ScanId) -> StoreResult<bool> {
        self.inner.delete_scan(id)
    }
    fn get_scan(&self, id: ScanId) -> StoreResult<Option<Scan>> {
        self.inner.get_scan(id)
    }
    fn list_scans(&self, limit: Option<usize>) -> StoreResult<Vec<Scan>> {
        self.inner.list_scans(limit)
    }
    fn add_node(&self, node: NewFolderNode) -> StoreResult<FolderNode> {
        if self.added.fetch_add(1, Ordering::SeqCst) >= self.allowed_nodes {
            return Err(StoreError::Corrupt("disk full".to_string()));
        }
        self.inner.add_node(node)
    }
    fn update_node(&self, node: &FolderNode) -> StoreResult<()> {
        self.inner.update_node(node)
    }
    fn get_node(&self, id: NodeId) -> StoreResult<Option<FolderNode>> {
        self.inner.get_node(id)
    }
    fn get_node_by_path(&self, scan: ScanId, path: &Path) -> StoreResult<Option<FolderNode>> {
        self.inner.get_node_by_path(scan, path)
    }
    fn get_nodes(&self, scan: ScanId, parent: Option<NodeId>) -> StoreResult<Vec<FolderNode>> {
        self.inner.get_nodes(scan, parent)
    }
    fn count_nodes(&self, scan: ScanId) -> StoreResult<u64> {
        self.inner.count_nodes(scan)
    }
    fn get_settings(&self) -> StoreResult<Option<Settings>> {
        self.inner.get_settings()
    }
    fn update_settings(&self, settings: &Settings) -> StoreResult<()> {
        self.inner.update_settings(settings)
    }
}

fn engine_over(fs: FakeFs) -> (Arc<MemoryStore>, Arc<FakeFs>, ScanEngine<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let fs = Arc::new(fs);
    let engine = ScanEngine::new(Arc::clone(&store)).with_filesystem(fs.clone());
    (store, fs, engine)
}

fn node(store: &MemoryStore, scan: ScanId, path: &str) -> Option<FolderNode> {
    store.get_node_by_path(scan, Path::new(path)).unwrap()
}

/// Check `size = own files + sum(children)` for every node under `parent`.
fn assert_aggregated(store: &MemoryStore, fs: &FakeFs, scan: ScanId, parent: &FolderNode) {
    let children = store.get_nodes(scan, Some(parent.id)).unwrap();
    let child_total: u64 = children.iter().map(|c| c.size_bytes).sum();
    assert_eq!(
        parent.size_bytes,
        fs.own_bytes(&parent.path) + child_total,
        "{}",
        parent.path.display()
    );
    for child in &children {
        assert_aggregated(store, fs, scan, child);
    }
}

#[test]
fn test_root_scenario_sizes() {
    let fs = FakeFs::default().file("/r/a", 100).file("/r/x/b", 50);
    let (store, _, engine) = engine_over(fs);

    let report = engine.start_scan("/r").unwrap();
    let scan = report.scan.id;

    let root = node(&store, scan, "/r").unwrap();
    assert_eq!((root.size_bytes, root.file_count), (150, 1));
    let x = node(&store, scan, "/r/x").unwrap();
    assert_eq!((x.size_bytes, x.file_count), (50, 1));
    assert_eq!(x.parent_id, Some(root.id));
}

#[test]
fn test_aggregation_invariant() {
    let fs = FakeFs::default()
        .file("/data/readme", 7)
        .file("/data/photos/2023/a.jpg", 4_000)
        .file("/data/photos/2023/b.jpg", 6_000)
        .file("/data/photos/2024/c.jpg", 1_500)
        .file("/data/photos/index", 12)
        .file("/data/music/album/01.flac", 30_000)
        .dir("/data/empty")
        .dir("/data/music/empty/deeper");
    let (store, fs, engine) = engine_over(fs);

    let report = engine.start_scan("/data").unwrap();
    assert_eq!(report.scan.status, ScanStatus::Completed);
    assert_eq!(report.scan.folders_scanned, 9);
    assert_eq!(report.scan.files_scanned, 6);
    assert_eq!(report.scan.total_bytes, 41_519);

    let root = node(&store, report.scan.id, "/data").unwrap();
    assert_eq!(root.size_bytes, 41_519);
    assert_aggregated(&store, &fs, report.scan.id, &root);
}

#[test]
fn test_access_denied_subdirectory_is_skipped() {
    let fs = FakeFs::default()
        .file("/r/a", 100)
        .file("/r/x/b", 50)
        .deny("/r/secret");
    let (store, _, engine) = engine_over(fs);

    let report = engine.start_scan("/r").unwrap();
    assert_eq!(report.scan.status, ScanStatus::Completed);
    assert!(node(&store, report.scan.id, "/r/secret").is_none());
    assert_eq!(node(&store, report.scan.id, "/r").unwrap().size_bytes, 150);

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, WarningKind::PermissionDenied);
    assert_eq!(report.warnings[0].path, PathBuf::from("/r/secret"));
}

#[test]
fn test_denied_root_still_yields_node() {
    let fs = FakeFs::default().deny("/r");
    let (store, _, engine) = engine_over(fs);

    let report = engine.start_scan("/r").unwrap();
    assert_eq!(report.scan.status, ScanStatus::Completed);

    let root = node(&store, report.scan.id, "/r").unwrap();
    assert_eq!((root.size_bytes, root.file_count), (0, 0));
    assert_eq!(report.warnings.len(), 2);
}

#[test]
fn test_other_listing_failures_keep_node() {
    let fs = FakeFs::default()
        .file("/r/a", 100)
        .file("/r/x/b", 50)
        .file("/r/x/y/c", 25)
        .broken_files("/r/x")
        .broken_subdirs("/r/x/y");
    let (store, fs, engine) = engine_over(fs);

    let report = engine.start_scan("/r").unwrap();
    let scan = report.scan.id;

    let x = node(&store, scan, "/r/x").unwrap();
    assert_eq!(x.file_count, 0);
    assert_eq!(x.size_bytes, 25);
    let y = node(&store, scan, "/r/x/y").unwrap();
    assert_eq!(y.size_bytes, 25);

    let root = node(&store, scan, "/r").unwrap();
    assert_eq!(root.size_bytes, 125);
    assert_aggregated(&store, &fs, scan, &root);
    assert!(
        report
            .warnings
            .iter()
            .all(|w| w.kind == WarningKind::ReadError)
    );
}

#[test]
fn test_folder_recorded_twice_is_skipped() {
    let fs = FakeFs::default()
        .file("/r/a", 100)
        .file("/r/x/b", 50)
        .listed_twice("/r/x");
    let (store, fs, engine) = engine_over(fs);

    let report = engine.start_scan("/r").unwrap();
    assert_eq!(report.scan.status, ScanStatus::Completed);
    assert_eq!(report.scan.folders_scanned, 2);
    assert_eq!(store.count_nodes(report.scan.id).unwrap(), 2);

    let root = node(&store, report.scan.id, "/r").unwrap();
    assert_eq!(root.size_bytes, 150);
    assert_aggregated(&store, &fs, report.scan.id, &root);

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, WarningKind::DuplicatePath);
    assert_eq!(report.warnings[0].path, PathBuf::from("/r/x"));
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_siblings_on_sqlite() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("r");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("a"), vec![0u8; 100]).unwrap();
    let odd = [root.join(OsStr::from_bytes(b"\xff")), root.join(OsStr::from_bytes(b"\xfe"))];
    for (dir, size) in odd.iter().zip([10usize, 20]) {
        std::fs::create_dir(dir).unwrap();
        std::fs::write(dir.join("f"), vec![0u8; size]).unwrap();
    }

    let store = Arc::new(SqliteStore::open(temp.path().join("snap.db")).unwrap());
    let engine = ScanEngine::new(Arc::clone(&store));
    let report = engine.start_scan(&root).unwrap();

    assert_eq!(report.scan.status, ScanStatus::Completed);
    assert!(report.warnings.is_empty());
    assert_eq!(store.count_nodes(report.scan.id).unwrap(), 3);

    let stored_root = store.get_node_by_path(report.scan.id, &root).unwrap().unwrap();
    assert_eq!(stored_root.size_bytes, 130);
    for (dir, size) in odd.iter().zip([10u64, 20]) {
        let child = store.get_node_by_path(report.scan.id, dir).unwrap().unwrap();
        assert_eq!(&child.path, dir);
        assert_eq!(child.size_bytes, size);
    }
}

#[test]
fn test_unreadable_file_excluded() {
    let fs = FakeFs::default()
        .file("/r/a", 100)
        .unreadable_file("/r/locked");
    let (store, _, engine) = engine_over(fs);

    let report = engine.start_scan("/r").unwrap();
    let root = node(&store, report.scan.id, "/r").unwrap();
    assert_eq!((root.size_bytes, root.file_count), (100, 1));
    assert_eq!(report.warnings[0].kind, WarningKind::MetadataError);
}

#[test]
fn test_store_failure_fails_scan() {
    let fs = Arc::new(FakeFs::default().file("/r/a", 1).file("/r/x/b", 2));
    let store = Arc::new(FlakyStore::new(1));
    let engine = ScanEngine::new(Arc::clone(&store)).with_filesystem(fs);

    let report = engine.start_scan("/r").unwrap();
    assert_eq!(report.scan.status, ScanStatus::Failed);
    assert!(report.scan.end_time.is_some());
    assert!(
        report
            .scan
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("disk full"))
    );

    let stored = store.get_scan(report.scan.id).unwrap().unwrap();
    assert_eq!(stored.status, ScanStatus::Failed);
    assert!(!engine.is_scanning());
}

#[test]
fn test_single_flight_and_cancellation() {
    let (fs, entered, release) = FakeFs::default()
        .file("/r/a", 100)
        .file("/r/x/b", 50)
        .gated("/r");
    let (store, _, engine) = engine_over(fs);
    let engine = Arc::new(engine);

    let worker = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.start_scan("/r"))
    };

    entered.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(engine.is_scanning());
    assert!(matches!(
        engine.start_scan("/r"),
        Err(EngineError::AlreadyScanning)
    ));

    engine.cancel_scan();
    release.send(()).unwrap();

    let report = worker.join().unwrap().unwrap();
    assert_eq!(report.scan.status, ScanStatus::Cancelled);
    assert!(report.scan.end_time.is_some());
    assert!(!engine.is_scanning());

    // The root was recorded before cancellation was observed; it stays.
    assert!(node(&store, report.scan.id, "/r").is_some());
    assert!(node(&store, report.scan.id, "/r/x").is_none());
    assert_eq!(store.list_scans(None).unwrap().len(), 1);
}

#[test]
fn test_progress_totals_never_decrease() {
    let fs = FakeFs::default()
        .file("/r/a", 10)
        .file("/r/b/c", 20)
        .file("/r/b/d/e", 30)
        .file("/r/f/g", 40);
    let (_, _, engine) = engine_over(fs);
    let mut rx = engine.subscribe();

    let report = engine.start_scan("/r").unwrap();

    let mut last = (0, 0, 0);
    let mut progress_events = 0;
    let mut finished = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            ScanEvent::Progress(p) => {
                let now = (p.folders_scanned, p.files_scanned, p.total_bytes);
                assert!(now.0 > last.0 && now.1 >= last.1 && now.2 >= last.2);
                last = now;
                progress_events += 1;
            }
            ScanEvent::Finished(scan) => finished = Some(scan),
        }
    }
    assert_eq!(progress_events, 4);
    assert_eq!(last, (4, 4, 100));
    assert_eq!(finished, Some(report.scan));
}

#[test]
fn test_two_scans_are_isolated() {
    let fs = FakeFs::default().file("/r/a", 100).file("/r/x/b", 50);
    let (store, _, engine) = engine_over(fs);

    let first = engine.start_scan("/r").unwrap().scan;
    let second = engine.start_scan("/r").unwrap().scan;
    assert_ne!(first.id, second.id);
    assert_eq!(store.count_nodes(first.id).unwrap(), 2);
    assert_eq!(store.count_nodes(second.id).unwrap(), 2);

    assert!(store.delete_scan(first.id).unwrap());
    assert_eq!(store.count_nodes(first.id).unwrap(), 0);
    assert_eq!(store.count_nodes(second.id).unwrap(), 2);
}

#[test]
fn test_checkpoint_persists_running_counters() {
    let fs = FakeFs::default().file("/r/a", 10).file("/r/b/c", 20);
    let store = Arc::new(MemoryStore::new());
    let config = diskstrata_core::ScanConfig::builder()
        .checkpoint_interval(1u64)
        .build()
        .unwrap();
    let engine = ScanEngine::new(Arc::clone(&store))
        .with_filesystem(Arc::new(fs))
        .with_config(config);

    let report = engine.start_scan("/r").unwrap();
    let stored = store.get_scan(report.scan.id).unwrap().unwrap();
    assert_eq!(stored.folders_scanned, 2);
    assert_eq!(stored.total_bytes, 30);
}

#[test]
fn test_recovery_on_sqlite_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("snap.db");
    let now = Utc::now();

    let (stale, finished) = {
        let store = SqliteStore::open(&path).unwrap();
        let stale = store.create_scan(now, ScanStatus::Running).unwrap();
        let mut finished = store.create_scan(now, ScanStatus::Running).unwrap();
        finished.complete(now).unwrap();
        store.update_scan(&finished).unwrap();
        (stale.id, finished.id)
    };

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(recover_stale_scans(&store, now).unwrap(), 1);

    let stale = store.get_scan(stale).unwrap().unwrap();
    assert_eq!(stale.status, ScanStatus::Cancelled);
    assert!(stale.end_time.is_some());
    assert_eq!(
        store.get_scan(finished).unwrap().unwrap().status,
        ScanStatus::Completed
    );
}
