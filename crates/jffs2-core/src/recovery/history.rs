//! File content history reconstruction
//!
//! Replays an inode's data nodes in version order over a growing buffer.
//! Byte ranges written since the last snapshot are tracked as pending; a
//! write that lands on a pending range supersedes it, so the buffer is
//! snapshotted first. Truncations always snapshot before discarding data.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Jffs2Error, Result};
use crate::fs::jffs2::compression::decompress_node;
use crate::fs::jffs2::index::FilesystemIndex;
use crate::fs::jffs2::nodes::InodeNode;

/// One historically distinct state of a file's contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    /// Position in the inode's snapshot sequence
    pub serial: u32,
    /// Version of the last node applied before the snapshot was taken
    pub version: Option<u32>,
    pub data: Vec<u8>,
}

impl FileSnapshot {
    /// Zero-padded serial, e.g. `0003`
    pub fn label(&self) -> String {
        format!("{:04}", self.serial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlushReason {
    /// A new write hit bytes not yet snapshotted
    Overlap,
    /// The node shrank the file
    Truncate,
    /// End of the node list
    Final,
}

/// Replay log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayEvent {
    /// A directory entry binding a name to this inode
    Entry {
        pino: u32,
        version: u32,
        name: String,
    },
    /// A directory entry listed inside this inode
    Child {
        version: u32,
        ino: u32,
        name: String,
    },
    Node {
        version: u32,
        offset: u64,
        foff: u32,
        dsize: u32,
        isize: u32,
        compr: u8,
    },
    DecodeFailed {
        version: u32,
        error: String,
    },
    LengthMismatch {
        version: u32,
        declared: u32,
        actual: usize,
    },
    Flush {
        serial: u32,
        reason: FlushReason,
    },
}

/// Every reconstructed revision of one inode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHistory {
    pub inode: u32,
    /// Names ever bound to the inode, in version order
    pub names: Vec<String>,
    pub snapshots: Vec<FileSnapshot>,
    pub log: Vec<ReplayEvent>,
}

impl FileHistory {
    /// Directory-safe name for this inode's artifacts: `ino_<n>_<names>`
    pub fn artifact_name(&self) -> String {
        let names: Vec<String> = self.names.iter().map(|n| clean_name(n.as_bytes())).collect();
        format!("ino_{}_{}", self.inode, names.join("_"))
    }

    /// The replay log as pretty JSON
    pub fn log_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.log)
    }

    /// Latest reconstructed state
    pub fn latest(&self) -> Option<&FileSnapshot> {
        self.snapshots.last()
    }
}

/// Hex-encode every byte outside `[A-Za-z0-9_.-]`
pub fn clean_name(name: &[u8]) -> String {
    let mut out = String::with_capacity(name.len());
    for &b in name {
        if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-') {
            out.push(b as char);
        } else {
            out.push_str(&format!("{:02x}", b));
        }
    }
    out
}

/// Half-open byte range `[start, start + len)`
#[derive(Debug, Clone, Copy)]
struct Span {
    start: i64,
    len: i64,
}

impl Span {
    /// Never intersects anything; keeps an empty file from going unreported
    const EMPTY_FILE: Span = Span { start: -1, len: 0 };

    fn end(&self) -> i64 {
        self.start + self.len
    }

    /// Touching ranges do not intersect
    fn intersects(&self, other: &Span) -> bool {
        self.end() > other.start && other.end() > self.start
    }
}

struct Replay {
    inode: u32,
    limit: u64,
    content: Vec<u8>,
    pending: Vec<Span>,
    serial: u32,
    last_version: Option<u32>,
    snapshots: Vec<FileSnapshot>,
    log: Vec<ReplayEvent>,
}

impl Replay {
    fn new(inode: u32, limit: u64) -> Self {
        Self {
            inode,
            limit,
            content: Vec::new(),
            pending: vec![Span::EMPTY_FILE],
            serial: 0,
            last_version: None,
            snapshots: Vec::new(),
            log: Vec::new(),
        }
    }

    fn flush(&mut self, reason: FlushReason) {
        tracing::debug!(
            "jffs2: inode {} snapshot {:04} ({:?}, {} bytes)",
            self.inode,
            self.serial,
            reason,
            self.content.len()
        );
        self.log.push(ReplayEvent::Flush {
            serial: self.serial,
            reason,
        });
        self.snapshots.push(FileSnapshot {
            serial: self.serial,
            version: self.last_version,
            data: self.content.clone(),
        });
        self.serial += 1;
        self.pending.clear();
    }

    fn apply(&mut self, node: &InodeNode) -> Result<()> {
        self.log.push(ReplayEvent::Node {
            version: node.version,
            offset: node.offset,
            foff: node.foff,
            dsize: node.dsize,
            isize: node.isize,
            compr: node.compr,
        });

        let decoded = decompress_node(node, self.limit);
        if let Some(e) = &decoded.error {
            self.log.push(ReplayEvent::DecodeFailed {
                version: node.version,
                error: e.to_string(),
            });
        }
        let data = decoded.data;
        if data.len() != node.dsize as usize {
            tracing::warn!(
                "jffs2: inode {} version {}: decoded {} bytes, node declares {}",
                node.ino,
                node.version,
                data.len(),
                node.dsize
            );
            self.log.push(ReplayEvent::LengthMismatch {
                version: node.version,
                declared: node.dsize,
                actual: data.len(),
            });
        }

        // Length after the hole fill and splice below
        let foff = node.foff as usize;
        let dsize = node.dsize as usize;
        let base = self.content.len().max(foff);
        let end = foff.saturating_add(dsize).min(base);
        let requested = (base - (end - foff) + data.len()) as u64;
        if requested > self.limit {
            return Err(Jffs2Error::FileTooLarge {
                inode: self.inode,
                requested,
                limit: self.limit,
            });
        }

        let span = Span {
            start: i64::from(node.foff),
            len: i64::from(node.dsize),
        };
        if self.pending.iter().any(|p| p.intersects(&span)) {
            self.flush(FlushReason::Overlap);
        }

        // Holes count as written data for overlap purposes
        if foff > self.content.len() {
            self.pending.push(Span {
                start: self.content.len() as i64,
                len: (foff - self.content.len()) as i64,
            });
            self.content.resize(foff, 0);
        }

        self.content.splice(foff..end, data);
        if dsize != 0 {
            self.pending.push(span);
        }
        self.last_version = Some(node.version);

        if (node.isize as usize) < self.content.len() {
            self.flush(FlushReason::Truncate);
            self.content.truncate(node.isize as usize);
        }

        Ok(())
    }

    fn finish(mut self) -> (Vec<FileSnapshot>, Vec<ReplayEvent>) {
        if !self.pending.is_empty() {
            self.flush(FlushReason::Final);
        }
        (self.snapshots, self.log)
    }
}

/// Replay version-ordered data nodes into snapshots
///
/// An empty node list yields a single empty snapshot. Fails only when a
/// node would grow the file past `limit` bytes.
pub fn replay_nodes(
    inode: u32,
    nodes: &[&InodeNode],
    limit: u64,
) -> Result<(Vec<FileSnapshot>, Vec<ReplayEvent>)> {
    let mut replay = Replay::new(inode, limit);
    for node in nodes {
        replay.apply(node)?;
    }
    Ok(replay.finish())
}

/// Names bound to `ino` across all directories, consecutive repeats dropped
pub fn inode_names(index: &FilesystemIndex, ino: u32) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for pino in index.parent_numbers() {
        for dirent in index.dent_sorted(pino) {
            if dirent.ino != ino {
                continue;
            }
            let name = dirent.display_name();
            if names.last() != Some(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Reconstruct every content revision of `ino`
pub fn file_history(index: &FilesystemIndex, ino: u32, limit: u64) -> Result<FileHistory> {
    let names = inode_names(index, ino);
    if names.is_empty() && !index.has_data(ino) && !index.has_entries(ino) {
        return Err(Jffs2Error::UnknownInode(ino));
    }

    let mut log: Vec<ReplayEvent> = Vec::new();
    for pino in index.parent_numbers() {
        for dirent in index.dent_sorted(pino) {
            if dirent.ino == ino {
                log.push(ReplayEvent::Entry {
                    pino,
                    version: dirent.version,
                    name: dirent.display_name(),
                });
            }
        }
    }

    for dirent in index.dent_sorted(ino) {
        log.push(ReplayEvent::Child {
            version: dirent.version,
            ino: dirent.ino,
            name: dirent.display_name(),
        });
    }

    let nodes = index.ino_sorted(ino);
    let (snapshots, replay_log) = replay_nodes(ino, &nodes, limit)?;
    log.extend(replay_log);

    tracing::info!(
        "jffs2: inode {} ({}): {} nodes, {} snapshots",
        ino,
        names.join(", "),
        nodes.len(),
        snapshots.len()
    );

    Ok(FileHistory {
        inode: ino,
        names,
        snapshots,
        log,
    })
}

/// Reconstruct every inode that has data nodes, ascending by inode number
pub fn all_file_histories(
    index: &FilesystemIndex,
    limit: u64,
    parallel: bool,
) -> Vec<(u32, Result<FileHistory>)> {
    let inodes: Vec<u32> = index.inode_numbers().collect();
    if parallel {
        inodes
            .par_iter()
            .map(|&ino| (ino, file_history(index, ino, limit)))
            .collect()
    } else {
        inodes
            .iter()
            .map(|&ino| (ino, file_history(index, ino, limit)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::jffs2::index::test_nodes::{dirent, inode};
    use crate::fs::jffs2::nodes::Jffs2Node;

    const LIMIT: u64 = 1 << 20;

    fn data_nodes(nodes: &[Jffs2Node]) -> Vec<&InodeNode> {
        nodes.iter().filter_map(Jffs2Node::as_inode).collect()
    }

    fn contents(snapshots: &[FileSnapshot]) -> Vec<&[u8]> {
        snapshots.iter().map(|s| s.data.as_slice()).collect()
    }

    #[test]
    fn test_no_nodes_yields_one_empty_snapshot() {
        let (snapshots, log) = replay_nodes(3, &[], LIMIT).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].data.is_empty());
        assert_eq!(snapshots[0].version, None);
        assert_eq!(
            log,
            vec![ReplayEvent::Flush {
                serial: 0,
                reason: FlushReason::Final
            }]
        );
    }

    #[test]
    fn test_overlapping_write_flushes_previous_state() {
        let nodes = vec![inode(2, 1, 0, b"hello", 5), inode(2, 2, 0, b"world", 5)];
        let (snapshots, _) = replay_nodes(2, &data_nodes(&nodes), LIMIT).unwrap();
        assert_eq!(contents(&snapshots), vec![&b"hello"[..], &b"world"[..]]);
        assert_eq!(snapshots[0].version, Some(1));
        assert_eq!(snapshots[1].serial, 1);
    }

    #[test]
    fn test_appending_writes_share_one_snapshot() {
        let nodes = vec![
            inode(2, 1, 0, b"abcd", 4),
            inode(2, 2, 4, b"efgh", 8),
            inode(2, 3, 8, b"ij", 10),
        ];
        let (snapshots, _) = replay_nodes(2, &data_nodes(&nodes), LIMIT).unwrap();
        assert_eq!(contents(&snapshots), vec![&b"abcdefghij"[..]]);
    }

    #[test]
    fn test_partial_overwrite() {
        let nodes = vec![inode(2, 1, 0, b"abcdef", 6), inode(2, 2, 2, b"XY", 6)];
        let (snapshots, _) = replay_nodes(2, &data_nodes(&nodes), LIMIT).unwrap();
        assert_eq!(contents(&snapshots), vec![&b"abcdef"[..], &b"abXYef"[..]]);
    }

    #[test]
    fn test_hole_is_zero_filled_and_counts_as_written() {
        let nodes = vec![
            inode(2, 1, 4, b"tail", 8),
            // Lands inside the zero-filled hole
            inode(2, 2, 1, b"h", 8),
        ];
        let (snapshots, _) = replay_nodes(2, &data_nodes(&nodes), LIMIT).unwrap();
        assert_eq!(
            contents(&snapshots),
            vec![&b"\0\0\0\0tail"[..], &b"\0h\0\0tail"[..]]
        );
    }

    #[test]
    fn test_truncation_flushes_then_cuts() {
        let nodes = vec![inode(2, 1, 0, b"0123456789", 10), inode(2, 2, 0, b"", 4)];
        let (snapshots, log) = replay_nodes(2, &data_nodes(&nodes), LIMIT).unwrap();
        // The truncation clears pending ranges, so no final flush follows
        assert_eq!(contents(&snapshots), vec![&b"0123456789"[..]]);
        assert!(log.contains(&ReplayEvent::Flush {
            serial: 0,
            reason: FlushReason::Truncate
        }));

        let nodes = vec![
            inode(2, 1, 0, b"0123456789", 10),
            inode(2, 2, 0, b"", 4),
            inode(2, 3, 4, b"!", 5),
        ];
        let (snapshots, _) = replay_nodes(2, &data_nodes(&nodes), LIMIT).unwrap();
        assert_eq!(contents(&snapshots), vec![&b"0123456789"[..], &b"0123!"[..]]);
    }

    #[test]
    fn test_touching_ranges_do_not_overlap() {
        let a = Span { start: 0, len: 4 };
        let b = Span { start: 4, len: 4 };
        assert!(!a.intersects(&b));
        assert!(!b.intersects(&a));
        assert!(a.intersects(&Span { start: 3, len: 1 }));
        assert!(!Span::EMPTY_FILE.intersects(&Span { start: 0, len: 10 }));
    }

    #[test]
    fn test_zero_length_write_inside_pending_range_flushes() {
        let nodes = vec![inode(2, 1, 0, b"abcdef", 6), inode(2, 2, 3, b"", 6)];
        let (snapshots, log) = replay_nodes(2, &data_nodes(&nodes), LIMIT).unwrap();
        assert_eq!(contents(&snapshots), vec![&b"abcdef"[..]]);
        assert!(log.contains(&ReplayEvent::Flush {
            serial: 0,
            reason: FlushReason::Overlap
        }));

        // At the end of the pending range it only touches
        let nodes = vec![inode(2, 1, 0, b"abcdef", 6), inode(2, 2, 6, b"", 6)];
        let (snapshots, log) = replay_nodes(2, &data_nodes(&nodes), LIMIT).unwrap();
        assert_eq!(contents(&snapshots), vec![&b"abcdef"[..]]);
        assert!(!log.iter().any(|e| matches!(
            e,
            ReplayEvent::Flush {
                reason: FlushReason::Overlap,
                ..
            }
        )));
    }

    #[test]
    fn test_inserted_data_counts_against_limit() {
        let mut nodes = vec![
            inode(2, 1, 0, b"0123456789", 10),
            inode(2, 2, 0, b"0123456789", 10),
            inode(2, 3, 0, b"0123456789", 10),
        ];
        // Declared size 0 splices the payload in without replacing anything
        for node in &mut nodes[1..] {
            if let Jffs2Node::Inode(n) = node {
                n.dsize = 0;
            }
        }
        let err = replay_nodes(2, &data_nodes(&nodes), 16).unwrap_err();
        assert!(matches!(
            err,
            Jffs2Error::FileTooLarge {
                inode: 2,
                requested: 20,
                limit: 16
            }
        ));

        let (snapshots, _) = replay_nodes(2, &data_nodes(&nodes[..1]), 10).unwrap();
        assert_eq!(contents(&snapshots), vec![&b"0123456789"[..]]);
    }

    #[test]
    fn test_growth_past_limit_is_fatal() {
        let nodes = vec![inode(2, 1, 0xFFFF_0000, b"x", 0xFFFF_0001)];
        let err = replay_nodes(2, &data_nodes(&nodes), LIMIT).unwrap_err();
        assert!(matches!(err, Jffs2Error::FileTooLarge { inode: 2, .. }));
    }

    #[test]
    fn test_file_history_names_and_artifact() {
        let index = FilesystemIndex::build(vec![
            dirent(1, 1, 2, "a.txt", 8),
            inode(2, 1, 0, b"hello", 5),
            dirent(1, 2, 0, "a.txt", 8),
            dirent(1, 3, 2, "b c.txt", 8),
            dirent(1, 4, 2, "b c.txt", 8),
        ]);
        let history = file_history(&index, 2, LIMIT).unwrap();
        assert_eq!(history.names, vec!["a.txt", "b c.txt"]);
        assert_eq!(history.artifact_name(), "ino_2_a.txt_b20c.txt");
        assert_eq!(history.latest().unwrap().data, b"hello");
        assert_eq!(history.latest().unwrap().label(), "0000");

        assert!(matches!(
            &history.log[0],
            ReplayEvent::Entry { pino: 1, version: 1, name } if name == "a.txt"
        ));
        assert!(!history.log.iter().any(|e| matches!(e, ReplayEvent::Child { .. })));

        let json = history.log_json().unwrap();
        assert!(json.contains("Entry"));
        assert!(json.contains("Flush"));
    }

    #[test]
    fn test_directory_history_logs_its_children() {
        let index = FilesystemIndex::build(vec![
            dirent(1, 1, 5, "etc", 4),
            dirent(5, 2, 6, "passwd", 8),
            dirent(5, 1, 7, "group", 8),
            inode(6, 1, 0, b"root", 4),
        ]);
        let history = file_history(&index, 5, LIMIT).unwrap();
        let children: Vec<(u32, u32, &str)> = history
            .log
            .iter()
            .filter_map(|e| match e {
                ReplayEvent::Child { version, ino, name } => {
                    Some((*version, *ino, name.as_str()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(children, vec![(1, 7, "group"), (2, 6, "passwd")]);
        assert_eq!(history.names, vec!["etc"]);
    }

    #[test]
    fn test_unknown_inode() {
        let index = FilesystemIndex::build(vec![inode(2, 1, 0, b"x", 1)]);
        assert!(matches!(
            file_history(&index, 42, LIMIT),
            Err(Jffs2Error::UnknownInode(42))
        ));
    }

    #[test]
    fn test_all_histories_sequential_and_parallel_agree() {
        let index = FilesystemIndex::build(vec![
            inode(2, 1, 0, b"two", 3),
            inode(3, 1, 0, b"three", 5),
            inode(3, 2, 0, b"THREE", 5),
        ]);
        let seq = all_file_histories(&index, LIMIT, false);
        let par = all_file_histories(&index, LIMIT, true);
        assert_eq!(seq.len(), 2);
        for ((ino_a, a), (ino_b, b)) in seq.iter().zip(par.iter()) {
            assert_eq!(ino_a, ino_b);
            assert_eq!(
                a.as_ref().unwrap().snapshots,
                b.as_ref().unwrap().snapshots
            );
        }
        assert_eq!(seq[1].1.as_ref().unwrap().snapshots.len(), 2);
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name(b"report-v1.2_final"), "report-v1.2_final");
        assert_eq!(clean_name(b"a/b c"), "a2fb20c");
    }
}
