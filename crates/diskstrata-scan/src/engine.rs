//! Single-flight scan engine.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use diskstrata_core::{Scan, ScanConfig, ScanStatus, ScanWarning, StatusError};
use diskstrata_store::{SnapshotStore, StoreError};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::fs::{FileSystem, StdFileSystem};
use crate::progress::ScanEvent;
use crate::walker::{DirectoryWalker, WalkError};

/// Capacity of the event channel. Slow receivers lose the oldest events.
const EVENT_CHANNEL_SIZE: usize = 256;

/// Errors returned by [`ScanEngine::start_scan`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another scan is in flight.
    #[error("A scan is already running")]
    AlreadyScanning,

    /// The scan record could not be created or finalized.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The scan record refused a status change.
    #[error(transparent)]
    Status(#[from] StatusError),
}

/// Final state of one scan run.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// The scan as persisted in its terminal status.
    pub scan: Scan,
    /// Problems recovered from during the walk.
    pub warnings: Vec<ScanWarning>,
}

/// Runs scans against a store, at most one at a time.
pub struct ScanEngine<S: ?Sized> {
    store: Arc<S>,
    fs: Arc<dyn FileSystem>,
    config: ScanConfig,
    scanning: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    events: broadcast::Sender<ScanEvent>,
}

impl<S: SnapshotStore + ?Sized> ScanEngine<S> {
    /// Create an engine reading the real filesystem.
    pub fn new(store: Arc<S>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            store,
            fs: Arc::new(StdFileSystem),
            config: ScanConfig::default(),
            scanning: AtomicBool::new(false),
            cancel: Mutex::new(None),
            events,
        }
    }

    /// Use another filesystem implementation.
    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Use another walk configuration.
    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    /// The store scans are written to.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Subscribe to progress and completion events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Whether a scan is in flight.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Ask the in-flight scan to stop at the next directory. No-op when idle.
    pub fn cancel_scan(&self) {
        let slot = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = slot.as_ref() {
            info!("Cancellation requested");
            token.cancel();
        }
    }

    /// Scan `root` into a new snapshot, blocking until the walk ends.
    ///
    /// Walk failures do not surface as `Err`: the returned scan carries the
    /// `Failed` or `Cancelled` status instead. `Err` means the scan could
    /// not be started or its final state could not be stored.
    pub fn start_scan(&self, root: impl AsRef<Path>) -> Result<ScanReport, EngineError> {
        let root = root.as_ref();
        let (_guard, token) = self.acquire()?;

        let mut scan = self.store.create_scan(Utc::now(), ScanStatus::Running)?;
        info!("Scan {} started at {}", scan.id, root.display());

        let mut walker = DirectoryWalker::new(
            &*self.store,
            &*self.fs,
            &self.config,
            &token,
            &self.events,
        );
        let outcome = walker.walk(root, None, &mut scan);
        let warnings = walker.into_warnings();

        let now = Utc::now();
        match outcome {
            Ok(node) => {
                scan.complete(now)?;
                info!(
                    "Scan {} completed: {} folders, {} files, {} bytes ({} warnings)",
                    scan.id,
                    scan.folders_scanned,
                    scan.files_scanned,
                    node.size_bytes,
                    warnings.len()
                );
            }
            Err(WalkError::Cancelled) => {
                scan.cancel(now)?;
                info!(
                    "Scan {} cancelled after {} folders",
                    scan.id, scan.folders_scanned
                );
            }
            Err(e) => {
                error!("Scan {} failed: {}", scan.id, e);
                scan.fail(e.to_string(), now)?;
            }
        }

        self.store.update_scan(&scan)?;
        let _ = self.events.send(ScanEvent::Finished(scan.clone()));
        Ok(ScanReport { scan, warnings })
    }

    fn acquire(&self) -> Result<(ScanGuard<'_>, CancellationToken), EngineError> {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::AlreadyScanning);
        }

        let token = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok((
            ScanGuard {
                scanning: &self.scanning,
                cancel: &self.cancel,
            },
            token,
        ))
    }
}

/// Releases the single-flight flag and drops the cancellation handle.
struct ScanGuard<'a> {
    scanning: &'a AtomicBool,
    cancel: &'a Mutex<Option<CancellationToken>>,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.scanning.store(false, Ordering::SeqCst);
    }
}
