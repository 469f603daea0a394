//! Per-scan folder nodes.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::BYTES_PER_GB;
use crate::scan::ScanId;

/// Unique identifier for a folder node, assigned by the snapshot store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Create a new NodeId from a u64.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display name of a directory: its last path segment, or the whole path
/// when there is none (e.g. `/`).
pub fn display_name(path: &Path) -> CompactString {
    path.file_name()
        .map(|n| CompactString::new(n.to_string_lossy()))
        .unwrap_or_else(|| CompactString::new(path.to_string_lossy()))
}

/// A node that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFolderNode {
    pub path: PathBuf,
    pub name: CompactString,
    pub size_bytes: u64,
    pub file_count: u64,
    pub last_scanned: DateTime<Utc>,
    pub parent_id: Option<NodeId>,
    pub scan_id: ScanId,
}

impl NewFolderNode {
    /// Describe a directory with its own-files totals.
    pub fn new(
        path: impl Into<PathBuf>,
        scan_id: ScanId,
        parent_id: Option<NodeId>,
        size_bytes: u64,
        file_count: u64,
        last_scanned: DateTime<Utc>,
    ) -> Self {
        let path = path.into();
        Self {
            name: display_name(&path),
            path,
            size_bytes,
            file_count,
            last_scanned,
            parent_id,
            scan_id,
        }
    }

    /// Attach the identity the store assigned.
    pub fn with_id(self, id: NodeId) -> FolderNode {
        FolderNode {
            id,
            path: self.path,
            name: self.name,
            size_bytes: self.size_bytes,
            file_count: self.file_count,
            last_scanned: self.last_scanned,
            parent_id: self.parent_id,
            scan_id: self.scan_id,
        }
    }
}

/// One directory's aggregate, scoped to one scan.
///
/// `size_bytes` covers the directory's own files plus every descendant;
/// `file_count` covers its own files only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderNode {
    /// Store-assigned identity.
    pub id: NodeId,
    /// Absolute path of the directory.
    pub path: PathBuf,
    /// Last path segment.
    pub name: CompactString,
    /// Aggregated size in bytes.
    pub size_bytes: u64,
    /// Number of files directly inside this directory.
    pub file_count: u64,
    /// When the directory was visited.
    pub last_scanned: DateTime<Utc>,
    /// Parent node within the same scan; `None` for the scan root.
    pub parent_id: Option<NodeId>,
    /// Owning scan.
    pub scan_id: ScanId,
}

impl FolderNode {
    /// Check if this node is a root of its scan.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Size in gigabytes.
    pub fn size_gb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_GB
    }

    /// Share of the parent's size, in percent.
    ///
    /// Roots and children of empty parents report 100.0.
    pub fn percentage_of(&self, parent: Option<&FolderNode>) -> f64 {
        match parent {
            Some(parent) if parent.size_bytes > 0 => {
                self.size_bytes as f64 * 100.0 / parent.size_bytes as f64
            }
            _ => 100.0,
        }
    }
}
