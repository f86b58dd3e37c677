/// Version-ordered index over all decoded nodes
///
/// Nodes live in one flat vector in scan order. Per-inode and per-parent
/// maps hold positions into it, each list sorted by node version so that
/// later writes come after the ones they supersede.
use std::collections::{BTreeMap, BTreeSet};

use super::nodes::{DirentNode, InodeNode, Jffs2Node};

#[derive(Debug, Default)]
pub struct FilesystemIndex {
    nodes: Vec<Jffs2Node>,
    /// inode number -> positions of its data nodes
    by_inode: BTreeMap<u32, Vec<usize>>,
    /// parent inode -> positions of its dirents
    by_parent: BTreeMap<u32, Vec<usize>>,
    root_inodes: BTreeSet<u32>,
}

impl FilesystemIndex {
    /// Index a node sequence in scan order
    ///
    /// Nodes are classified by their decoded shape, not by their type tag:
    /// anything with a parent inode is a dirent, anything carrying a
    /// compression method is a data node, the rest is not indexed.
    pub fn build(nodes: Vec<Jffs2Node>) -> Self {
        let mut by_inode: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        let mut by_parent: BTreeMap<u32, Vec<usize>> = BTreeMap::new();

        for (pos, node) in nodes.iter().enumerate() {
            match node {
                Jffs2Node::Dirent(d) => by_parent.entry(d.pino).or_default().push(pos),
                Jffs2Node::Inode(i) => by_inode.entry(i.ino).or_default().push(pos),
                Jffs2Node::Opaque(_) => {}
            }
        }

        // Stable: equal versions keep scan order
        for positions in by_inode.values_mut() {
            positions.sort_by_key(|&pos| nodes[pos].as_inode().map(|n| n.version));
        }
        for positions in by_parent.values_mut() {
            positions.sort_by_key(|&pos| nodes[pos].as_dirent().map(|n| n.version));
        }

        let children: BTreeSet<u32> = by_parent
            .values()
            .flatten()
            .filter_map(|&pos| nodes[pos].as_dirent())
            .map(|d| d.ino)
            .collect();
        let root_inodes = by_parent
            .keys()
            .copied()
            .filter(|pino| !children.contains(pino))
            .collect();

        let index = Self {
            nodes,
            by_inode,
            by_parent,
            root_inodes,
        };

        tracing::info!(
            "jffs2: indexed {} nodes: {} inodes with data, {} directories, roots {:?}",
            index.nodes.len(),
            index.by_inode.len(),
            index.by_parent.len(),
            index.root_inodes
        );

        index
    }

    /// Every decoded node in scan order
    pub fn nodes(&self) -> &[Jffs2Node] {
        &self.nodes
    }

    /// Directories never linked as anybody's child
    pub fn root_inodes(&self) -> &BTreeSet<u32> {
        &self.root_inodes
    }

    /// Inode numbers that have data nodes, ascending
    pub fn inode_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_inode.keys().copied()
    }

    /// Inode numbers that have dirents, ascending
    pub fn parent_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.by_parent.keys().copied()
    }

    /// Data nodes of `ino` in version order
    pub fn ino_sorted(&self, ino: u32) -> Vec<&InodeNode> {
        self.by_inode
            .get(&ino)
            .into_iter()
            .flatten()
            .filter_map(|&pos| self.nodes[pos].as_inode())
            .collect()
    }

    /// Dirents inside directory `pino` in version order
    pub fn dent_sorted(&self, pino: u32) -> Vec<&DirentNode> {
        self.by_parent
            .get(&pino)
            .into_iter()
            .flatten()
            .filter_map(|&pos| self.nodes[pos].as_dirent())
            .collect()
    }

    /// Whether `ino` has any directory entries
    pub fn has_entries(&self, ino: u32) -> bool {
        self.by_parent.contains_key(&ino)
    }

    pub fn has_data(&self, ino: u32) -> bool {
        self.by_inode.contains_key(&ino)
    }

    /// All dirents in scan order
    pub fn dirents(&self) -> impl Iterator<Item = &DirentNode> + '_ {
        self.nodes.iter().filter_map(Jffs2Node::as_dirent)
    }

    /// All data nodes in scan order
    pub fn inodes(&self) -> impl Iterator<Item = &InodeNode> + '_ {
        self.nodes.iter().filter_map(Jffs2Node::as_inode)
    }
}


#[cfg(test)]
mod tests {
    use super::test_nodes::{dirent, inode};
    use super::*;
    use crate::fs::jffs2::nodes::{NodeKind, OpaqueNode, DT_DIR};

    #[test]
    fn test_versions_are_sorted() {
        let index = FilesystemIndex::build(vec![
            inode(2, 3, 0, b"c", 1),
            inode(2, 1, 0, b"a", 1),
            dirent(1, 5, 2, "x", 8),
            inode(2, 2, 0, b"b", 1),
            dirent(1, 4, 3, "y", 8),
        ]);

        let versions: Vec<u32> = index.ino_sorted(2).iter().map(|n| n.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        let versions: Vec<u32> = index.dent_sorted(1).iter().map(|n| n.version).collect();
        assert_eq!(versions, vec![4, 5]);
        assert!(index.ino_sorted(99).is_empty());
        assert!(index.dent_sorted(99).is_empty());
    }

    #[test]
    fn test_equal_versions_keep_scan_order() {
        let index = FilesystemIndex::build(vec![
            inode(2, 1, 0, b"first", 5),
            inode(2, 1, 0, b"second", 6),
        ]);
        let data: Vec<&[u8]> = index.ino_sorted(2).iter().map(|n| n.data.as_slice()).collect();
        assert_eq!(data, vec![&b"first"[..], &b"second"[..]]);
    }

    #[test]
    fn test_root_inodes() {
        // 1 -> {2 (dir), 3}; 2 -> {4}; 7 -> {8}; 8 is linked, 7 is not
        let index = FilesystemIndex::build(vec![
            dirent(1, 1, 2, "etc", DT_DIR),
            dirent(1, 2, 3, "readme", 8),
            dirent(2, 1, 4, "passwd", 8),
            dirent(7, 1, 8, "lost", 8),
            dirent(8, 1, 9, "found", 8),
        ]);
        let roots: Vec<u32> = index.root_inodes().iter().copied().collect();
        assert_eq!(roots, vec![1, 7]);
    }

    #[test]
    fn test_root_excludes_parents_linked_anywhere() {
        // Linked only by a later unlink still counts as linked
        let index = FilesystemIndex::build(vec![
            dirent(1, 1, 5, "d", DT_DIR),
            dirent(5, 1, 6, "f", 8),
            dirent(1, 2, 0, "d", DT_DIR),
        ]);
        let roots: Vec<u32> = index.root_inodes().iter().copied().collect();
        assert_eq!(roots, vec![1]);
    }

    #[test]
    fn test_opaque_nodes_are_not_indexed() {
        let index = FilesystemIndex::build(vec![Jffs2Node::Opaque(OpaqueNode {
            offset: 0,
            node_type: 0x2003,
            kind: NodeKind::CleanMarker,
            raw: Vec::new(),
            pad: Vec::new(),
        })]);
        assert_eq!(index.nodes().len(), 1);
        assert_eq!(index.inode_numbers().count(), 0);
        assert_eq!(index.parent_numbers().count(), 0);
        assert!(index.root_inodes().is_empty());
    }
}
