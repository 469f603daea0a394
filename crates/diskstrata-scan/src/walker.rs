//! Sequential depth-first directory walk that persists one node per folder.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use diskstrata_core::{
    FolderNode, NewFolderNode, NodeId, Scan, ScanConfig, ScanWarning, display_name,
};
use diskstrata_store::{SnapshotStore, StoreError};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::fs::{FileEntry, FileSystem};
use crate::progress::{ProgressTracker, ScanEvent};

/// Reasons a walk of one directory did not produce a node.
#[derive(Debug, Error)]
pub enum WalkError {
    /// Cancellation was requested before entering the directory.
    #[error("Scan cancelled")]
    Cancelled,

    /// The directory could not be read. Its subtree is left out.
    #[error("Access denied: {}", path.display())]
    AccessDenied { path: PathBuf },

    /// The store already holds a folder at this path. Its subtree is left out.
    #[error("Already recorded: {}", path.display())]
    AlreadyRecorded { path: PathBuf },

    /// The store rejected a write; the whole scan fails.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Walks a directory tree for one scan.
///
/// Each directory becomes a [`FolderNode`] holding its own files. The node is
/// persisted before its subdirectories are visited and updated with the
/// aggregated size once they are done, so a child never exists without its
/// parent.
pub struct DirectoryWalker<'a, S: ?Sized> {
    store: &'a S,
    fs: &'a dyn FileSystem,
    config: &'a ScanConfig,
    cancel: &'a CancellationToken,
    events: &'a broadcast::Sender<ScanEvent>,
    tracker: ProgressTracker,
    warnings: Vec<ScanWarning>,
    since_checkpoint: u64,
}

impl<'a, S: SnapshotStore + ?Sized> DirectoryWalker<'a, S> {
    pub fn new(
        store: &'a S,
        fs: &'a dyn FileSystem,
        config: &'a ScanConfig,
        cancel: &'a CancellationToken,
        events: &'a broadcast::Sender<ScanEvent>,
    ) -> Self {
        Self {
            store,
            fs,
            config,
            cancel,
            events,
            tracker: ProgressTracker::new(),
            warnings: Vec::new(),
            since_checkpoint: 0,
        }
    }

    /// Consume the walker, keeping its warnings.
    pub fn into_warnings(self) -> Vec<ScanWarning> {
        self.warnings
    }

    /// Walk `path` and everything below it into `scan`.
    ///
    /// Returns the node for `path` with its size aggregated over every
    /// visited descendant. The counters of `scan` grow by each directory's
    /// own files as it is recorded.
    pub fn walk(
        &mut self,
        path: &Path,
        parent: Option<NodeId>,
        scan: &mut Scan,
    ) -> Result<FolderNode, WalkError> {
        if self.cancel.is_cancelled() {
            return Err(WalkError::Cancelled);
        }

        let (own_bytes, own_files) = match self.fs.list_files(path) {
            Ok(entries) => self.sum_files(entries),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied && parent.is_some() => {
                warn!("Access denied to {}, skipping", path.display());
                self.record_warning(ScanWarning::permission_denied(path));
                return Err(WalkError::AccessDenied {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => {
                warn!("Failed to list files in {}: {}", path.display(), e);
                self.record_warning(ScanWarning::from_io(path, &e));
                (0, 0)
            }
        };

        let added = self.store.add_node(NewFolderNode::new(
            path,
            scan.id,
            parent,
            own_bytes,
            own_files,
            Utc::now(),
        ));
        let mut node = match added {
            Ok(node) => node,
            Err(StoreError::DuplicateNode { .. }) if parent.is_some() => {
                warn!("{} already recorded in scan {}, skipping", path.display(), scan.id);
                self.record_warning(ScanWarning::duplicate_path(path));
                return Err(WalkError::AlreadyRecorded {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        scan.record_folder(own_files, own_bytes);
        self.report(path, scan);
        self.checkpoint(scan)?;

        let subdirs = match self.fs.list_subdirs(path) {
            Ok(subdirs) => subdirs,
            Err(e) => {
                warn!("Failed to list subdirectories of {}: {}", path.display(), e);
                self.record_warning(ScanWarning::from_io(path, &e));
                Vec::new()
            }
        };

        let mut total = own_bytes;
        for subdir in subdirs {
            if !self.config.accepts(&display_name(&subdir)) {
                continue;
            }
            match self.walk(&subdir, Some(node.id), scan) {
                Ok(child) => total += child.size_bytes,
                // Already logged where it happened.
                Err(WalkError::AccessDenied { .. } | WalkError::AlreadyRecorded { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        node.size_bytes = total;
        node.last_scanned = Utc::now();
        self.store.update_node(&node)?;
        Ok(node)
    }

    fn sum_files(&mut self, entries: Vec<FileEntry>) -> (u64, u64) {
        let mut bytes = 0;
        let mut count = 0;
        for entry in entries {
            if !self.config.accepts(&display_name(&entry.path)) {
                continue;
            }
            match entry.size {
                Ok(size) => {
                    bytes += size;
                    count += 1;
                }
                Err(e) => {
                    warn!("Skipping {}: {}", entry.path.display(), e);
                    self.record_warning(ScanWarning::metadata_error(&entry.path, &e));
                }
            }
        }
        (bytes, count)
    }

    fn record_warning(&mut self, warning: ScanWarning) {
        self.tracker.record_warning();
        self.warnings.push(warning);
    }

    fn report(&self, path: &Path, scan: &Scan) {
        let progress = self.tracker.snapshot(scan, path.to_path_buf());
        // No subscribers is fine.
        let _ = self.events.send(ScanEvent::Progress(progress));
    }

    fn checkpoint(&mut self, scan: &Scan) -> Result<(), StoreError> {
        if self.config.checkpoint_interval == 0 {
            return Ok(());
        }
        self.since_checkpoint += 1;
        if self.since_checkpoint >= self.config.checkpoint_interval {
            self.since_checkpoint = 0;
            self.store.update_scan(scan)?;
            debug!(
                "Checkpointed scan {} at {} folders",
                scan.id, scan.folders_scanned
            );
        }
        Ok(())
    }
}
