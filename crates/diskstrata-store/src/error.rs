//! Error types for snapshot stores.

use std::path::PathBuf;

use diskstrata_core::{NodeId, ScanId};
use thiserror::Error;

/// Errors raised by a [`SnapshotStore`](crate::SnapshotStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A node for this path already exists in the scan.
    #[error("Folder {} already recorded for scan {scan}", path.display())]
    DuplicateNode { path: PathBuf, scan: ScanId },

    /// The scan does not exist.
    #[error("Scan {0} not found")]
    ScanNotFound(ScanId),

    /// The folder node does not exist.
    #[error("Folder node {0} not found")]
    NodeNotFound(NodeId),

    /// The parent belongs to another scan.
    #[error("Parent node {parent} does not belong to scan {scan}")]
    ForeignParent { parent: NodeId, scan: ScanId },

    /// SQLite failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem failure while preparing the store.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another process holds the scan lock of this database.
    #[error("Database {} is being scanned by another process", path.display())]
    Locked { path: PathBuf },

    /// A persisted value could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A thread panicked while holding the store lock.
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
