//! In-memory snapshot store.

use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use diskstrata_core::{FolderNode, NewFolderNode, NodeId, Scan, ScanId, ScanStatus, Settings};

use crate::SnapshotStore;
use crate::error::{StoreError, StoreResult};

/// Snapshot store backed by concurrent maps.
///
/// Nothing survives the process; mainly useful for tests.
#[derive(Debug)]
pub struct MemoryStore {
    next_scan_id: AtomicU64,
    next_node_id: AtomicU64,
    scans: DashMap<ScanId, Scan>,
    nodes: DashMap<NodeId, FolderNode>,
    /// Uniqueness index on (scan, path).
    paths: DashMap<(ScanId, PathBuf), NodeId>,
    settings: RwLock<Option<Settings>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            next_scan_id: AtomicU64::new(1),
            next_node_id: AtomicU64::new(1),
            scans: DashMap::new(),
            nodes: DashMap::new(),
            paths: DashMap::new(),
            settings: RwLock::new(None),
        }
    }

    /// Total number of nodes across all scans.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for MemoryStore {
    fn create_scan(&self, start_time: DateTime<Utc>, status: ScanStatus) -> StoreResult<Scan> {
        let id = ScanId::new(self.next_scan_id.fetch_add(1, Ordering::Relaxed));
        let scan = Scan::new(id, start_time, status);
        self.scans.insert(id, scan.clone());
        Ok(scan)
    }

    fn update_scan(&self, scan: &Scan) -> StoreResult<()> {
        match self.scans.get_mut(&scan.id) {
            Some(mut stored) => {
                *stored = scan.clone();
                Ok(())
            }
            None => Err(StoreError::ScanNotFound(scan.id)),
        }
    }

    fn delete_scan(&self, id: ScanId) -> StoreResult<bool> {
        if self.scans.remove(&id).is_none() {
            return Ok(false);
        }
        self.nodes.retain(|_, node| node.scan_id != id);
        self.paths.retain(|(scan, _), _| *scan != id);
        Ok(true)
    }

    fn get_scan(&self, id: ScanId) -> StoreResult<Option<Scan>> {
        Ok(self.scans.get(&id).map(|scan| scan.clone()))
    }

    fn list_scans(&self, limit: Option<usize>) -> StoreResult<Vec<Scan>> {
        let mut scans: Vec<Scan> = self.scans.iter().map(|entry| entry.value().clone()).collect();
        scans.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            scans.truncate(limit);
        }
        Ok(scans)
    }

    fn add_node(&self, node: NewFolderNode) -> StoreResult<FolderNode> {
        if !self.scans.contains_key(&node.scan_id) {
            return Err(StoreError::ScanNotFound(node.scan_id));
        }
        if let Some(parent) = node.parent_id {
            let parent_scan = self
                .nodes
                .get(&parent)
                .map(|p| p.scan_id)
                .ok_or(StoreError::NodeNotFound(parent))?;
            if parent_scan != node.scan_id {
                return Err(StoreError::ForeignParent {
                    parent,
                    scan: node.scan_id,
                });
            }
        }

        match self.paths.entry((node.scan_id, node.path.clone())) {
            Entry::Occupied(_) => Err(StoreError::DuplicateNode {
                path: node.path,
                scan: node.scan_id,
            }),
            Entry::Vacant(slot) => {
                let id = NodeId::new(self.next_node_id.fetch_add(1, Ordering::Relaxed));
                let stored = node.with_id(id);
                self.nodes.insert(id, stored.clone());
                slot.insert(id);
                Ok(stored)
            }
        }
    }

    fn update_node(&self, node: &FolderNode) -> StoreResult<()> {
        let mut stored = self
            .nodes
            .get_mut(&node.id)
            .ok_or(StoreError::NodeNotFound(node.id))?;
        stored.size_bytes = node.size_bytes;
        stored.file_count = node.file_count;
        stored.last_scanned = node.last_scanned;
        Ok(())
    }

    fn get_node(&self, id: NodeId) -> StoreResult<Option<FolderNode>> {
        Ok(self.nodes.get(&id).map(|node| node.clone()))
    }

    fn get_node_by_path(&self, scan: ScanId, path: &Path) -> StoreResult<Option<FolderNode>> {
        let id = match self.paths.get(&(scan, path.to_path_buf())) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get_node(id)
    }

    fn get_nodes(&self, scan: ScanId, parent: Option<NodeId>) -> StoreResult<Vec<FolderNode>> {
        let mut nodes: Vec<FolderNode> = self
            .nodes
            .iter()
            .filter(|entry| entry.scan_id == scan && entry.parent_id == parent)
            .map(|entry| entry.value().clone())
            .collect();
        nodes.sort_by_key(|node| node.id);
        Ok(nodes)
    }

    fn count_nodes(&self, scan: ScanId) -> StoreResult<u64> {
        Ok(self.nodes.iter().filter(|entry| entry.scan_id == scan).count() as u64)
    }

    fn get_settings(&self) -> StoreResult<Option<Settings>> {
        let settings = self.settings.read().map_err(|_| StoreError::Poisoned)?;
        Ok(settings.clone())
    }

    fn update_settings(&self, settings: &Settings) -> StoreResult<()> {
        let mut stored = self.settings.write().map_err(|_| StoreError::Poisoned)?;
        *stored = Some(settings.clone());
        Ok(())
    }
}
