/// JFFS2 node records and the payload decoder
///
/// A scanned node is classified by its type tag (masked to the low 12
/// bits) and its fixed-layout fields are decoded in the dump's byte order.
/// Node kinds this crate does not interpret are kept as opaque records.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;

use super::scanner::RawNode;
use crate::fs::common::{Endianness, FieldReader};

/// Mask applied to the header type tag before classification
pub const TYPE_MASK: u16 = 0x0fff;
pub const TYPE_DIRENT: u16 = 1;
pub const TYPE_INODE: u16 = 2;
pub const TYPE_CLEANMARKER: u16 = 3;
pub const TYPE_PADDING: u16 = 4;
pub const TYPE_SUMMARY: u16 = 6;
pub const TYPE_XATTR: u16 = 8;
pub const TYPE_XREF: u16 = 9;

/// Fixed part of an inode payload
pub const INODE_FIXED_SIZE: usize = 56;
/// Fixed part of a dirent payload
pub const DIRENT_FIXED_SIZE: usize = 28;

/// Directory entry type for directories
pub const DT_DIR: u8 = 4;

/// Classification of a node's masked type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Dirent,
    Inode,
    CleanMarker,
    Padding,
    Summary,
    Xattr,
    XattrRef,
    Unknown(u16),
}

impl NodeKind {
    pub fn from_tag(tag: u16) -> Self {
        match tag & TYPE_MASK {
            TYPE_DIRENT => NodeKind::Dirent,
            TYPE_INODE => NodeKind::Inode,
            TYPE_CLEANMARKER => NodeKind::CleanMarker,
            TYPE_PADDING => NodeKind::Padding,
            TYPE_SUMMARY => NodeKind::Summary,
            TYPE_XATTR => NodeKind::Xattr,
            TYPE_XREF => NodeKind::XattrRef,
            other => NodeKind::Unknown(other),
        }
    }
}

/// One write event to a file's metadata and data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InodeNode {
    pub offset: u64,
    pub node_type: u16,
    pub ino: u32,
    pub version: u32,
    pub mode: u32,
    pub uid: u16,
    pub gid: u16,
    /// Logical file size after this write
    pub isize: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    /// File offset covered by this node
    pub foff: u32,
    /// Compressed payload length
    pub csize: u32,
    /// Decompressed payload length
    pub dsize: u32,
    pub compr: u8,
    pub usercompr: u8,
    pub flags: u16,
    pub data_crc: u32,
    pub node_crc: u32,
    pub data: Vec<u8>,
    pub pad: Vec<u8>,
}

impl InodeNode {
    pub fn atime_utc(&self) -> String {
        format_timestamp(self.atime)
    }

    pub fn mtime_utc(&self) -> String {
        format_timestamp(self.mtime)
    }

    pub fn ctime_utc(&self) -> String {
        format_timestamp(self.ctime)
    }
}

/// One name binding event inside a directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirentNode {
    pub offset: u64,
    pub node_type: u16,
    pub pino: u32,
    pub version: u32,
    /// Child inode; 0 unlinks the name
    pub ino: u32,
    pub mctime: u32,
    pub nsize: u8,
    pub itype: u8,
    pub unused: u16,
    pub node_crc: u32,
    pub name_crc: u32,
    pub name: Vec<u8>,
    pub name_pad: Vec<u8>,
    pub pad: Vec<u8>,
}

impl DirentNode {
    pub fn mctime_utc(&self) -> String {
        format_timestamp(self.mctime)
    }

    /// Name for display; invalid UTF-8 is replaced
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    pub fn is_directory(&self) -> bool {
        self.itype == DT_DIR
    }

    pub fn is_unlink(&self) -> bool {
        self.ino == 0
    }
}

/// A node kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueNode {
    pub offset: u64,
    pub node_type: u16,
    pub kind: NodeKind,
    pub raw: Vec<u8>,
    pub pad: Vec<u8>,
}

/// A decoded node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Jffs2Node {
    Inode(InodeNode),
    Dirent(DirentNode),
    Opaque(OpaqueNode),
}

impl Jffs2Node {
    pub fn offset(&self) -> u64 {
        match self {
            Jffs2Node::Inode(n) => n.offset,
            Jffs2Node::Dirent(n) => n.offset,
            Jffs2Node::Opaque(n) => n.offset,
        }
    }

    pub fn node_type(&self) -> u16 {
        match self {
            Jffs2Node::Inode(n) => n.node_type,
            Jffs2Node::Dirent(n) => n.node_type,
            Jffs2Node::Opaque(n) => n.node_type,
        }
    }

    pub fn as_inode(&self) -> Option<&InodeNode> {
        match self {
            Jffs2Node::Inode(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_dirent(&self) -> Option<&DirentNode> {
        match self {
            Jffs2Node::Dirent(n) => Some(n),
            _ => None,
        }
    }

    /// Keep a raw node without interpreting it
    pub fn opaque(raw: &RawNode<'_>) -> Self {
        Jffs2Node::Opaque(OpaqueNode {
            offset: raw.offset,
            node_type: raw.node_type,
            kind: NodeKind::from_tag(raw.node_type),
            raw: raw.payload.to_vec(),
            pad: raw.pad.to_vec(),
        })
    }
}

/// Payload too short for the fixed layout its tag announces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortPayload {
    pub kind: NodeKind,
    pub needed: usize,
    pub available: usize,
}

/// Decode a raw node by its masked type tag
///
/// Inode and dirent payloads shorter than their fixed layout are reported
/// as [`ShortPayload`]; callers keep such nodes as opaque records.
pub fn decode_node(raw: &RawNode<'_>, endianness: Endianness) -> Result<Jffs2Node, ShortPayload> {
    let kind = NodeKind::from_tag(raw.node_type);
    let needed = match kind {
        NodeKind::Inode => INODE_FIXED_SIZE,
        NodeKind::Dirent => DIRENT_FIXED_SIZE,
        _ => return Ok(Jffs2Node::opaque(raw)),
    };

    let short = ShortPayload {
        kind,
        needed,
        available: raw.payload.len(),
    };
    if raw.payload.len() < needed {
        return Err(short);
    }

    let mut reader = FieldReader::new(raw.payload, endianness);
    let decoded = match kind {
        NodeKind::Inode => decode_inode(raw, &mut reader).map(Jffs2Node::Inode),
        _ => decode_dirent(raw, &mut reader).map(Jffs2Node::Dirent),
    };
    // The length check above makes the fixed reads infallible
    decoded.map_err(|_| short)
}

fn decode_inode(raw: &RawNode<'_>, r: &mut FieldReader<'_>) -> io::Result<InodeNode> {
    Ok(InodeNode {
        offset: raw.offset,
        node_type: raw.node_type,
        ino: r.u32()?,
        version: r.u32()?,
        mode: r.u32()?,
        uid: r.u16()?,
        gid: r.u16()?,
        isize: r.u32()?,
        atime: r.u32()?,
        mtime: r.u32()?,
        ctime: r.u32()?,
        foff: r.u32()?,
        csize: r.u32()?,
        dsize: r.u32()?,
        compr: r.u8()?,
        usercompr: r.u8()?,
        flags: r.u16()?,
        data_crc: r.u32()?,
        node_crc: r.u32()?,
        data: r.remaining().to_vec(),
        pad: raw.pad.to_vec(),
    })
}

fn decode_dirent(raw: &RawNode<'_>, r: &mut FieldReader<'_>) -> io::Result<DirentNode> {
    let pino = r.u32()?;
    let version = r.u32()?;
    let ino = r.u32()?;
    let mctime = r.u32()?;
    let nsize = r.u8()?;
    let itype = r.u8()?;
    let unused = r.u16()?;
    let node_crc = r.u32()?;
    let name_crc = r.u32()?;

    let tail = r.remaining();
    let split = (nsize as usize).min(tail.len());

    Ok(DirentNode {
        offset: raw.offset,
        node_type: raw.node_type,
        pino,
        version,
        ino,
        mctime,
        nsize,
        itype,
        unused,
        node_crc,
        name_crc,
        name: tail[..split].to_vec(),
        name_pad: tail[split..].to_vec(),
        pad: raw.pad.to_vec(),
    })
}

/// Render an epoch timestamp as `YYYY-MM-DD HH:MM:SS Z`
pub fn format_timestamp(secs: u32) -> String {
    DateTime::<Utc>::from_timestamp(i64::from(secs), 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S Z").to_string())
        .unwrap_or_default()
}
