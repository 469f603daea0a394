//! Read-side access to snapshots.

use std::path::Path;
use std::sync::Arc;

use diskstrata_core::{FolderNode, NodeId, Scan, ScanId, ScanStatus, Settings};
use diskstrata_store::{SnapshotStore, StoreResult};
use tracing::{debug, info};

use crate::compare::ScanComparison;
use crate::tree::{FolderEntry, FolderTree};

/// Queries over stored snapshots.
///
/// Every tree read takes an optional scan. Without one, the most recent
/// `Completed` scan is used; running, failed and cancelled scans are never
/// picked implicitly. When no completed scan exists the reads return empty
/// results instead of errors.
pub struct SnapshotQueryService<S: ?Sized> {
    store: Arc<S>,
}

impl<S: SnapshotStore + ?Sized> SnapshotQueryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Most recent scan that completed.
    pub fn latest_completed_scan(&self) -> StoreResult<Option<Scan>> {
        self.store.latest_scan_with_status(ScanStatus::Completed)
    }

    /// Most recent scan in any status.
    pub fn latest_scan(&self) -> StoreResult<Option<Scan>> {
        self.store.latest_scan()
    }

    /// Up to `count` scans, newest first.
    pub fn recent_scans(&self, count: usize) -> StoreResult<Vec<Scan>> {
        self.store.list_scans(Some(count))
    }

    pub fn scan(&self, id: ScanId) -> StoreResult<Option<Scan>> {
        self.store.get_scan(id)
    }

    /// The scan a read should use: `scan` if given, else the latest completed.
    pub fn resolve_scan(&self, scan: Option<ScanId>) -> StoreResult<Option<ScanId>> {
        match scan {
            Some(id) => Ok(Some(id)),
            None => Ok(self.latest_completed_scan()?.map(|s| s.id)),
        }
    }

    /// Root folder of a scan.
    pub fn root_folder(&self, scan: Option<ScanId>) -> StoreResult<Option<FolderNode>> {
        let Some(scan) = self.resolve_scan(scan)? else {
            return Ok(None);
        };
        Ok(self.store.get_nodes(scan, None)?.into_iter().next())
    }

    pub fn folder(&self, id: NodeId) -> StoreResult<Option<FolderNode>> {
        self.store.get_node(id)
    }

    pub fn folder_by_path(
        &self,
        path: &Path,
        scan: Option<ScanId>,
    ) -> StoreResult<Option<FolderNode>> {
        let Some(scan) = self.resolve_scan(scan)? else {
            return Ok(None);
        };
        self.store.get_node_by_path(scan, path)
    }

    /// Direct children of `parent`, largest first.
    pub fn children(&self, parent: NodeId) -> StoreResult<Vec<FolderNode>> {
        let Some(node) = self.store.get_node(parent)? else {
            return Ok(Vec::new());
        };
        self.sorted_children(&node)
    }

    /// Nodes under `parent` (or the scan's roots) with their direct children.
    ///
    /// A given `parent` fixes the scan; `scan` is only used for the roots.
    pub fn folder_tree(
        &self,
        parent: Option<NodeId>,
        scan: Option<ScanId>,
    ) -> StoreResult<Vec<FolderEntry>> {
        let nodes = match parent {
            Some(parent) => self.children(parent)?,
            None => {
                let Some(scan) = self.resolve_scan(scan)? else {
                    return Ok(Vec::new());
                };
                let mut roots = self.store.get_nodes(scan, None)?;
                sort_by_size(&mut roots);
                roots
            }
        };

        nodes
            .into_iter()
            .map(|node| {
                let children = self.sorted_children(&node)?;
                Ok(FolderEntry { node, children })
            })
            .collect()
    }

    /// Nested tree from the scan's root down to `max_depth` levels below it.
    pub fn load_tree(
        &self,
        scan: Option<ScanId>,
        max_depth: usize,
    ) -> StoreResult<Option<FolderTree>> {
        let Some(root) = self.root_folder(scan)? else {
            return Ok(None);
        };
        let tree = self.subtree(root, max_depth)?;
        debug!("Loaded {} folders for display", tree.node_count());
        Ok(Some(tree))
    }

    /// Share of the parent folder taken by `node`, in percent.
    pub fn percentage_of_parent(&self, node: &FolderNode) -> StoreResult<f64> {
        let parent = match node.parent_id {
            Some(id) => self.store.get_node(id)?,
            None => None,
        };
        Ok(node.percentage_of(parent.as_ref()))
    }

    /// Delete a scan and its folders. Returns `false` if it did not exist.
    pub fn delete_scan(&self, id: ScanId) -> StoreResult<bool> {
        let deleted = self.store.delete_scan(id)?;
        if deleted {
            info!("Deleted scan {id}");
        }
        Ok(deleted)
    }

    /// Compare the roots of two scans and their direct children.
    pub fn compare_scans(&self, older: ScanId, newer: ScanId) -> StoreResult<ScanComparison> {
        let older_root = self.root_folder(Some(older))?;
        let newer_root = self.root_folder(Some(newer))?;
        let older_children = match &older_root {
            Some(root) => self.store.get_nodes(older, Some(root.id))?,
            None => Vec::new(),
        };
        let newer_children = match &newer_root {
            Some(root) => self.store.get_nodes(newer, Some(root.id))?,
            None => Vec::new(),
        };

        Ok(ScanComparison::build(
            older,
            newer,
            older_root.as_ref(),
            newer_root.as_ref(),
            older_children,
            newer_children,
        ))
    }

    pub fn settings(&self) -> StoreResult<Option<Settings>> {
        self.store.get_settings()
    }

    pub fn update_settings(&self, settings: &Settings) -> StoreResult<()> {
        self.store.update_settings(settings)
    }

    fn sorted_children(&self, node: &FolderNode) -> StoreResult<Vec<FolderNode>> {
        let mut children = self.store.get_nodes(node.scan_id, Some(node.id))?;
        sort_by_size(&mut children);
        Ok(children)
    }

    fn subtree(&self, node: FolderNode, depth: usize) -> StoreResult<FolderTree> {
        let children = if depth == 0 {
            Vec::new()
        } else {
            self.sorted_children(&node)?
                .into_iter()
                .map(|child| self.subtree(child, depth - 1))
                .collect::<StoreResult<Vec<_>>>()?
        };
        Ok(FolderTree { node, children })
    }
}

/// Largest first; ties keep insertion order.
fn sort_by_size(nodes: &mut [FolderNode]) {
    nodes.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
}
