//! Directory hierarchy reconstruction
//!
//! A directory's contents are the version-ordered dirents recorded under
//! its inode. The last dirent for a name decides whether the name exists
//! now (nonzero child) or was unlinked (child 0); earlier dirents are the
//! name's history.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use crate::fs::jffs2::index::FilesystemIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

/// One distinct name inside a directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub name: String,
    pub raw_name: Vec<u8>,
    pub kind: EntryKind,
    /// Inodes bound to the name over time, in version order; 0 marks an unlink
    pub inodes: Vec<u32>,
}

impl ChildEntry {
    /// Inode the name resolves to now
    pub fn current_inode(&self) -> Option<u32> {
        self.inodes.last().copied().filter(|&ino| ino != 0)
    }

    pub fn is_deleted(&self) -> bool {
        self.current_inode().is_none()
    }

    /// Distinct nonzero inodes ever bound to the name, first-seen order
    pub fn linked_inodes(&self) -> Vec<u32> {
        let mut seen = HashSet::new();
        self.inodes
            .iter()
            .copied()
            .filter(|&ino| ino != 0 && seen.insert(ino))
            .collect()
    }
}

/// A name in the flattened hierarchy listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub depth: usize,
    pub parent: u32,
    /// Slash-separated path from the root directory
    pub path: String,
    pub entry: ChildEntry,
}

enum Work {
    Emit(TreeEntry),
    Expand {
        pino: u32,
        depth: usize,
        path: String,
        ancestors: Vec<u32>,
    },
}

/// Read-only hierarchy view over an index
pub struct TreeView<'a> {
    index: &'a FilesystemIndex,
    /// child inode -> (parent, name) it is best known under
    links: HashMap<u32, (u32, String)>,
}

impl<'a> TreeView<'a> {
    pub fn new(index: &'a FilesystemIndex) -> Self {
        let mut links: HashMap<u32, (u32, String)> = HashMap::new();
        let mut historical: Vec<(u32, u32, String)> = Vec::new();

        for pino in index.parent_numbers() {
            for child in list_children(index, pino) {
                if let Some(ino) = child.current_inode() {
                    links.entry(ino).or_insert((pino, child.name.clone()));
                }
                for ino in child.linked_inodes() {
                    historical.push((ino, pino, child.name.clone()));
                }
            }
        }
        // Unlinked inodes fall back to their latest historical name
        for (ino, pino, name) in historical {
            links.entry(ino).or_insert((pino, name));
        }

        Self { index, links }
    }

    pub fn list_root_inodes(&self) -> Vec<u32> {
        self.index.root_inodes().iter().copied().collect()
    }

    pub fn list_children(&self, pino: u32) -> Vec<ChildEntry> {
        list_children(self.index, pino)
    }

    /// Depth-first listing from every root, names sorted within a directory
    ///
    /// Each name is followed by the subtrees of every inode it was ever
    /// bound to. An inode already on the current path is not entered again.
    pub fn walk(&self) -> Vec<TreeEntry> {
        let mut out = Vec::new();
        let mut stack: Vec<Work> = self
            .index
            .root_inodes()
            .iter()
            .rev()
            .map(|&root| Work::Expand {
                pino: root,
                depth: 0,
                path: String::new(),
                ancestors: vec![root],
            })
            .collect();

        while let Some(work) = stack.pop() {
            match work {
                Work::Emit(entry) => out.push(entry),
                Work::Expand {
                    pino,
                    depth,
                    path,
                    ancestors,
                } => {
                    let mut batch = Vec::new();
                    for child in list_children(self.index, pino) {
                        let child_path = format!("{}/{}", path, child.name);
                        let subdirs: Vec<u32> = child
                            .linked_inodes()
                            .into_iter()
                            .filter(|ino| self.index.has_entries(*ino))
                            .collect();

                        batch.push(Work::Emit(TreeEntry {
                            depth,
                            parent: pino,
                            path: child_path.clone(),
                            entry: child,
                        }));

                        for ino in subdirs {
                            if ancestors.contains(&ino) {
                                tracing::warn!(
                                    "jffs2: directory cycle: inode {} under {}",
                                    ino,
                                    child_path
                                );
                                continue;
                            }
                            let mut chain = ancestors.clone();
                            chain.push(ino);
                            batch.push(Work::Expand {
                                pino: ino,
                                depth: depth + 1,
                                path: child_path.clone(),
                                ancestors: chain,
                            });
                        }
                    }
                    stack.extend(batch.into_iter().rev());
                }
            }
        }

        out
    }

    /// Absolute path of `ino` through the names it is best known under
    pub fn path_of(&self, ino: u32) -> Option<PathBuf> {
        if self.index.root_inodes().contains(&ino) {
            return Some(PathBuf::from("/"));
        }

        let mut components = Vec::new();
        let mut visited = HashSet::new();
        let mut current = ino;
        while let Some((pino, name)) = self.links.get(&current) {
            if !visited.insert(current) {
                break;
            }
            components.push(name.clone());
            current = *pino;
        }

        if components.is_empty() {
            return None;
        }

        let mut path = PathBuf::from("/");
        for name in components.iter().rev() {
            path.push(name);
        }
        Some(path)
    }
}

/// Distinct names inside `pino`, sorted by raw name bytes
pub fn list_children(index: &FilesystemIndex, pino: u32) -> Vec<ChildEntry> {
    let mut by_name: BTreeMap<Vec<u8>, ChildEntry> = BTreeMap::new();
    for dirent in index.dent_sorted(pino) {
        let entry = by_name
            .entry(dirent.name.clone())
            .or_insert_with(|| ChildEntry {
                name: dirent.display_name(),
                raw_name: dirent.name.clone(),
                kind: EntryKind::File,
                inodes: Vec::new(),
            });
        entry.inodes.push(dirent.ino);
        if dirent.is_directory() {
            entry.kind = EntryKind::Directory;
        }
    }
    by_name.into_values().collect()
}

/// Inodes every current name in the hierarchy resolves to
pub fn live_inodes(index: &FilesystemIndex) -> BTreeSet<u32> {
    index
        .parent_numbers()
        .flat_map(|pino| list_children(index, pino))
        .filter_map(|child| child.current_inode())
        .collect()
}
