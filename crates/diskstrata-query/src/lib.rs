//! Read side of diskstrata.
//!
//! [`SnapshotQueryService`] answers "what does the disk look like" from the
//! stored snapshots: the latest completed tree, a specific scan's tree,
//! scan history and size changes between two scans.

mod compare;
mod service;
mod tree;

pub use compare::{ScanComparison, SizeDelta};
pub use service::SnapshotQueryService;
pub use tree::{FolderEntry, FolderTree};
