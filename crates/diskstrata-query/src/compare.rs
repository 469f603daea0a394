//! Size changes between two snapshots.

use std::path::PathBuf;

use compact_str::CompactString;
use diskstrata_core::{FolderNode, ScanId};
use itertools::{EitherOrBoth, Itertools};
use serde::Serialize;

/// Size of one folder in two scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeDelta {
    pub name: CompactString,
    /// Path in the newer scan, or the older one if the folder disappeared.
    pub path: PathBuf,
    /// `None` when the folder did not exist in the older scan.
    pub older_bytes: Option<u64>,
    /// `None` when the folder no longer exists in the newer scan.
    pub newer_bytes: Option<u64>,
}

impl SizeDelta {
    fn between(older: Option<&FolderNode>, newer: Option<&FolderNode>) -> Option<Self> {
        let source = newer.or(older)?;
        Some(Self {
            name: source.name.clone(),
            path: source.path.clone(),
            older_bytes: older.map(|n| n.size_bytes),
            newer_bytes: newer.map(|n| n.size_bytes),
        })
    }

    /// Signed growth in bytes; absent sides count as zero.
    pub fn delta_bytes(&self) -> i128 {
        i128::from(self.newer_bytes.unwrap_or(0)) - i128::from(self.older_bytes.unwrap_or(0))
    }

    pub fn is_new(&self) -> bool {
        self.older_bytes.is_none()
    }

    pub fn is_removed(&self) -> bool {
        self.newer_bytes.is_none()
    }
}

/// Result of comparing the roots of two scans and their direct children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanComparison {
    pub older: ScanId,
    pub newer: ScanId,
    /// Root folders, `None` when neither scan has one.
    pub root: Option<SizeDelta>,
    /// Direct children matched by name, largest absolute change first.
    pub children: Vec<SizeDelta>,
}

impl ScanComparison {
    pub(crate) fn build(
        older: ScanId,
        newer: ScanId,
        older_root: Option<&FolderNode>,
        newer_root: Option<&FolderNode>,
        older_children: Vec<FolderNode>,
        newer_children: Vec<FolderNode>,
    ) -> Self {
        let older_children = older_children
            .into_iter()
            .sorted_by(|a, b| a.name.cmp(&b.name));
        let newer_children = newer_children
            .into_iter()
            .sorted_by(|a, b| a.name.cmp(&b.name));

        let children = older_children
            .merge_join_by(newer_children, |a, b| a.name.cmp(&b.name))
            .filter_map(|pair| match pair {
                EitherOrBoth::Both(a, b) => SizeDelta::between(Some(&a), Some(&b)),
                EitherOrBoth::Left(a) => SizeDelta::between(Some(&a), None),
                EitherOrBoth::Right(b) => SizeDelta::between(None, Some(&b)),
            })
            .sorted_by(|a, b| {
                b.delta_bytes()
                    .abs()
                    .cmp(&a.delta_bytes().abs())
                    .then_with(|| a.name.cmp(&b.name))
            })
            .collect();

        Self {
            older,
            newer,
            root: SizeDelta::between(older_root, newer_root),
            children,
        }
    }

    /// Change of the root folder in bytes.
    pub fn total_delta(&self) -> i128 {
        self.root.as_ref().map(SizeDelta::delta_bytes).unwrap_or(0)
    }
}
