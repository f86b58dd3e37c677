/// JFFS2 dump analysis
///
/// The medium is a flat append log of versioned nodes with no directory
/// table. Analysis scans every node, decodes it, and indexes the results
/// by inode and by parent directory; the tree, the timeline and every
/// file's content history are all derived from that index.
use serde::{Deserialize, Serialize};

pub mod compression;
pub mod crc;
pub mod index;
pub mod nodes;
pub mod scanner;

pub use compression::{decompress_node, CompressionMethod, Decompressed, Decompressor};
pub use crc::HeaderCheck;
pub use index::FilesystemIndex;
pub use nodes::{decode_node, DirentNode, InodeNode, Jffs2Node, NodeKind, OpaqueNode};
pub use scanner::{DiagnosticKind, NodeScanner, RawNode, ScanDiagnostic, NODE_MAGIC};

use super::common::{DumpImage, Endianness};
use crate::error::{Jffs2Error, Result};
use crate::recovery::history::{self, FileHistory};
use crate::recovery::tree::{ChildEntry, TreeEntry, TreeView};
use crate::timeline::Timeline;

/// Scan and reconstruction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub endianness: Endianness,
    pub header_check: HeaderCheck,
    /// Upper bound on a reconstructed file and on one decompressed payload
    pub max_file_size: u64,
    /// Reconstruct independent inodes on the rayon pool
    pub parallel_processing: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            endianness: Endianness::Big,
            header_check: HeaderCheck::Skip,
            max_file_size: 1024 * 1024 * 1024, // 1GB
            parallel_processing: true,
        }
    }
}

/// A scanned and indexed dump
#[derive(Debug)]
pub struct Jffs2Filesystem {
    config: ScanConfig,
    index: FilesystemIndex,
    diagnostics: Vec<ScanDiagnostic>,
    image_size: u64,
    erased_bytes: u64,
}

impl Jffs2Filesystem {
    /// Scan, decode and index a whole dump held in memory
    pub fn from_bytes(data: &[u8], config: ScanConfig) -> Result<Self> {
        if data.is_empty() {
            return Err(Jffs2Error::EmptyImage);
        }

        let outcome = NodeScanner::new(config.endianness, config.header_check).scan(data);
        let mut diagnostics = outcome.diagnostics;

        let nodes: Vec<Jffs2Node> = outcome
            .nodes
            .iter()
            .map(|raw| match decode_node(raw, config.endianness) {
                Ok(node) => node,
                Err(short) => {
                    let diagnostic = ScanDiagnostic {
                        offset: raw.offset,
                        kind: DiagnosticKind::ShortPayload {
                            kind: short.kind,
                            needed: short.needed,
                            available: short.available,
                        },
                    };
                    tracing::warn!("jffs2: {}", diagnostic);
                    diagnostics.push(diagnostic);
                    Jffs2Node::opaque(raw)
                }
            })
            .collect();
        diagnostics.sort_by_key(|d| d.offset);

        let index = FilesystemIndex::build(nodes);

        tracing::info!(
            "jffs2: {} bytes scanned, {} nodes, {} diagnostics",
            data.len(),
            index.nodes().len(),
            diagnostics.len()
        );

        Ok(Self {
            config,
            index,
            diagnostics,
            image_size: data.len() as u64,
            erased_bytes: outcome.erased_bytes,
        })
    }

    /// Map a dump file and analyze it
    pub fn open<P: AsRef<std::path::Path>>(path: P, config: ScanConfig) -> anyhow::Result<Self> {
        let image = DumpImage::open(path.as_ref())?;
        tracing::info!(
            "jffs2: opened {} ({} bytes)",
            path.as_ref().display(),
            image.size()
        );
        Ok(Self::from_bytes(image.bytes(), config)?)
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn index(&self) -> &FilesystemIndex {
        &self.index
    }

    /// Corruption and decode anomalies in dump order
    pub fn diagnostics(&self) -> &[ScanDiagnostic] {
        &self.diagnostics
    }

    pub fn image_size(&self) -> u64 {
        self.image_size
    }

    pub fn erased_bytes(&self) -> u64 {
        self.erased_bytes
    }

    pub fn list_root_inodes(&self) -> Vec<u32> {
        self.tree_view().list_root_inodes()
    }

    pub fn list_children(&self, parent_inode: u32) -> Vec<ChildEntry> {
        self.tree_view().list_children(parent_inode)
    }

    /// Flattened hierarchy listing from every root
    pub fn tree(&self) -> Vec<TreeEntry> {
        self.tree_view().walk()
    }

    pub fn path_of(&self, inode: u32) -> Option<std::path::PathBuf> {
        self.tree_view().path_of(inode)
    }

    pub fn tree_view(&self) -> TreeView<'_> {
        TreeView::new(&self.index)
    }

    pub fn timeline(&self) -> Timeline {
        Timeline::from_index(&self.index)
    }

    /// Every content revision of `inode` and the names it was known by
    pub fn file_history(&self, inode: u32) -> Result<FileHistory> {
        history::file_history(&self.index, inode, self.config.max_file_size)
    }

    /// Histories of every inode with data nodes, ascending
    pub fn all_file_histories(&self) -> Vec<(u32, Result<FileHistory>)> {
        history::all_file_histories(
            &self.index,
            self.config.max_file_size,
            self.config.parallel_processing,
        )
    }

    /// Dirents recorded inside `parent_inode`, version order
    pub fn dentry_history(&self, parent_inode: u32) -> Vec<&DirentNode> {
        self.index.dent_sorted(parent_inode)
    }

    /// Data nodes of `inode`, version order
    pub fn inode_history(&self, inode: u32) -> Vec<&InodeNode> {
        self.index.ino_sorted(inode)
    }

    /// Both record histories of `inode` as JSON, for diagnostic dumps
    pub fn records_json(&self, inode: u32) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Records<'a> {
            dirents: Vec<&'a DirentNode>,
            inodes: Vec<&'a InodeNode>,
        }
        serde_json::to_string_pretty(&Records {
            dirents: self.dentry_history(inode),
            inodes: self.inode_history(inode),
        })
    }
}

/// Guess the byte order of a dump from its first non-erased word
///
/// The magic bytes read the same in both orders, so the node type field
/// decides: it must name a known node kind with a compatibility flag set.
/// Returns `None` when the buffer is erased or does not open with a node
/// header.
pub fn detect_endianness(data: &[u8]) -> Option<Endianness> {
    let first = data.iter().position(|&b| b != 0xFF)? & !3;
    let header = data.get(first..first + 4)?;
    if header[..2] != NODE_MAGIC {
        return None;
    }

    let plausible = |tag: u16| {
        tag & !nodes::TYPE_MASK != 0 && !matches!(NodeKind::from_tag(tag), NodeKind::Unknown(_))
    };
    let tag_bytes = [header[2], header[3]];
    if plausible(u16::from_be_bytes(tag_bytes)) {
        Some(Endianness::Big)
    } else if plausible(u16::from_le_bytes(tag_bytes)) {
        Some(Endianness::Little)
    } else {
        None
    }
}

/// Whether `data` looks like a JFFS2 dump in the given byte order
pub fn looks_like_jffs2(data: &[u8], endianness: Endianness) -> bool {
    detect_endianness(data) == Some(endianness)
}
