//! Nested views over a snapshot's flat node table.

use diskstrata_core::FolderNode;
use serde::Serialize;

/// A node together with its direct children, largest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderEntry {
    pub node: FolderNode,
    pub children: Vec<FolderNode>,
}

/// A node and its loaded descendants, children sorted by size descending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderTree {
    pub node: FolderNode,
    pub children: Vec<FolderTree>,
}

impl FolderTree {
    /// Number of nodes in this tree, including the root.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(FolderTree::node_count).sum::<usize>()
    }

    /// Depth of the deepest loaded level (0 for a lone root).
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Share of this tree's root occupied by `child`, in percent.
    pub fn share(&self, child: &FolderTree) -> f64 {
        child.node.percentage_of(Some(&self.node))
    }

    /// Visit nodes depth-first with their depth.
    pub fn walk(&self, visit: &mut impl FnMut(&FolderTree, usize)) {
        self.walk_at(0, visit);
    }

    fn walk_at(&self, depth: usize, visit: &mut impl FnMut(&FolderTree, usize)) {
        visit(self, depth);
        for child in &self.children {
            child.walk_at(depth + 1, visit);
        }
    }
}
