//! Snapshot storage for diskstrata.
//!
//! The scan engine, scheduler and query service only talk to storage through
//! the [`SnapshotStore`] trait. Two implementations ship here:
//!
//! - [`MemoryStore`] - concurrent in-memory maps, for tests and throwaway runs
//! - [`SqliteStore`] - a single-file SQLite database with cascading deletes
//!
//! Every implementation must enforce the same constraints:
//!
//! - at most one node per `(path, scan)` pair
//! - deleting a scan removes every node that belongs to it
//! - [`SnapshotStore::list_scans`] returns scans newest first by start time
//!
//! Scans from separate processes are serialized with a [`ScanLock`] held
//! next to the database file.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use diskstrata_core::{NewFolderNode, ScanStatus};
//! use diskstrata_store::{MemoryStore, SnapshotStore};
//!
//! let store = MemoryStore::new();
//! let scan = store.create_scan(Utc::now(), ScanStatus::Running).unwrap();
//! let root = store
//!     .add_node(NewFolderNode::new("/mnt", scan.id, None, 0, 0, Utc::now()))
//!     .unwrap();
//!
//! assert_eq!(store.get_nodes(scan.id, None).unwrap(), vec![root]);
//! assert!(store.delete_scan(scan.id).unwrap());
//! assert_eq!(store.count_nodes(scan.id).unwrap(), 0);
//! ```

mod error;
mod lock;
mod memory;
mod sqlite;

use std::path::Path;

use chrono::{DateTime, Utc};
use diskstrata_core::{FolderNode, NewFolderNode, NodeId, Scan, ScanId, ScanStatus, Settings};

pub use error::{StoreError, StoreResult};
pub use lock::{ScanLock, lock_path_for};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Durable keyed storage for scans, folder nodes and settings.
pub trait SnapshotStore: Send + Sync {
    /// Create a scan record with zeroed counters.
    fn create_scan(&self, start_time: DateTime<Utc>, status: ScanStatus) -> StoreResult<Scan>;

    /// Overwrite a scan record's status, times, error and counters.
    fn update_scan(&self, scan: &Scan) -> StoreResult<()>;

    /// Delete a scan together with all its nodes. Returns `false` if absent.
    fn delete_scan(&self, id: ScanId) -> StoreResult<bool>;

    /// Fetch one scan.
    fn get_scan(&self, id: ScanId) -> StoreResult<Option<Scan>>;

    /// Scans ordered by start time, newest first.
    fn list_scans(&self, limit: Option<usize>) -> StoreResult<Vec<Scan>>;

    /// Persist a new node and return it with its assigned id.
    fn add_node(&self, node: NewFolderNode) -> StoreResult<FolderNode>;

    /// Persist a node's size, file count and scan time.
    ///
    /// Path, parent and scan are fixed once the node is added.
    fn update_node(&self, node: &FolderNode) -> StoreResult<()>;

    /// Fetch one node.
    fn get_node(&self, id: NodeId) -> StoreResult<Option<FolderNode>>;

    /// Fetch the node recorded for `path` in `scan`.
    fn get_node_by_path(&self, scan: ScanId, path: &Path) -> StoreResult<Option<FolderNode>>;

    /// Nodes of `scan` whose parent is `parent` (`None` selects the roots).
    fn get_nodes(&self, scan: ScanId, parent: Option<NodeId>) -> StoreResult<Vec<FolderNode>>;

    /// Number of nodes belonging to `scan`.
    fn count_nodes(&self, scan: ScanId) -> StoreResult<u64>;

    /// The settings singleton, if it was ever written.
    fn get_settings(&self) -> StoreResult<Option<Settings>>;

    /// Create or replace the settings singleton.
    fn update_settings(&self, settings: &Settings) -> StoreResult<()>;

    /// Most recent scan in any status.
    fn latest_scan(&self) -> StoreResult<Option<Scan>> {
        Ok(self.list_scans(Some(1))?.into_iter().next())
    }

    /// Most recent scan in `status`.
    fn latest_scan_with_status(&self, status: ScanStatus) -> StoreResult<Option<Scan>> {
        Ok(self.scans_with_status(&[status])?.into_iter().next())
    }

    /// Scans whose status is one of `statuses`, newest first.
    fn scans_with_status(&self, statuses: &[ScanStatus]) -> StoreResult<Vec<Scan>> {
        Ok(self
            .list_scans(None)?
            .into_iter()
            .filter(|scan| statuses.contains(&scan.status))
            .collect())
    }
}
