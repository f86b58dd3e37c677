/// Linear node scanner over a raw flash dump
///
/// The medium is an append log of variable-length nodes, each behind a
/// 12-byte header:
///
/// ```text
/// | 0x19 | 0x85 |  node type  |
/// |      total length         |   (header included)
/// |      header crc           |
/// ```
///
/// The two magic bytes are single-byte constants and read the same in
/// either byte order; only the multi-byte fields follow the configured
/// endianness.
///
/// Nodes are 32-bit aligned. Erased flash reads as 0xFF and is skipped in
/// 512-byte windows; anything else that fails the header check is
/// corruption and triggers a resync on the next magic sequence.
use serde::{Deserialize, Serialize};

use super::crc::{CrcVerdict, HeaderCheck};
use super::nodes::NodeKind;
use crate::fs::common::{Endianness, FieldReader};

pub const NODE_MAGIC: [u8; 2] = [0x19, 0x85];
pub const HEADER_SIZE: usize = 12;

/// Erased-space check granularity
pub const ERASE_WINDOW: usize = 512;
/// How far ahead a resync looks for the next magic
pub const RESYNC_WINDOW: usize = 1024;

/// A node as laid out on flash, borrowing from the dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNode<'a> {
    pub offset: u64,
    pub node_type: u16,
    /// Total length including the header
    pub length: u32,
    pub hdr_crc: u32,
    pub payload: &'a [u8],
    /// Alignment filler after the node
    pub pad: &'a [u8],
}

/// Anomalies found while scanning or decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Neither a node header nor erased flash
    BadSignature { header: Vec<u8> },
    /// Magic matched but the declared length cannot hold a header
    InvalidLength { length: u32 },
    HeaderCrcMismatch { stored: u32, computed: u32 },
    /// Node runs past the end of the dump
    TruncatedNode { declared: u32, available: u64 },
    /// Payload shorter than the fixed layout of its node kind
    ShortPayload {
        kind: NodeKind,
        needed: usize,
        available: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanDiagnostic {
    pub offset: u64,
    pub kind: DiagnosticKind,
}

impl std::fmt::Display for ScanDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            DiagnosticKind::BadSignature { header } => {
                write!(f, "bad node signature at 0x{:X} {}", self.offset, hex_string(header))
            }
            DiagnosticKind::InvalidLength { length } => {
                write!(f, "invalid node length {} at 0x{:X}", length, self.offset)
            }
            DiagnosticKind::HeaderCrcMismatch { stored, computed } => write!(
                f,
                "header crc mismatch at 0x{:X}: stored {:08x}, computed {:08x}",
                self.offset, stored, computed
            ),
            DiagnosticKind::TruncatedNode {
                declared,
                available,
            } => write!(
                f,
                "node at 0x{:X} declares {} bytes, only {} left in dump",
                self.offset, declared, available
            ),
            DiagnosticKind::ShortPayload {
                kind,
                needed,
                available,
            } => write!(
                f,
                "{:?} node at 0x{:X} needs {} payload bytes, has {}",
                kind, self.offset, needed, available
            ),
        }
    }
}

/// Result of one pass over the dump
#[derive(Debug, Default)]
pub struct ScanOutcome<'a> {
    pub nodes: Vec<RawNode<'a>>,
    pub diagnostics: Vec<ScanDiagnostic>,
    /// Bytes skipped as erased flash
    pub erased_bytes: u64,
}

/// Scanner configuration and entry point
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeScanner {
    pub endianness: Endianness,
    pub header_check: HeaderCheck,
}

struct Header {
    magic: [u8; 2],
    node_type: u16,
    length: u32,
    hdr_crc: u32,
}

impl NodeScanner {
    pub fn new(endianness: Endianness, header_check: HeaderCheck) -> Self {
        Self {
            endianness,
            header_check,
        }
    }

    /// Walk the whole dump once
    pub fn scan<'a>(&self, data: &'a [u8]) -> ScanOutcome<'a> {
        let mut outcome = ScanOutcome::default();
        let mut off = 0usize;

        while off < data.len() {
            let header_bytes = &data[off..(off + HEADER_SIZE).min(data.len())];

            let rejection = match self.parse_header(header_bytes) {
                Some(header) if header.magic == NODE_MAGIC => {
                    if (header.length as usize) < HEADER_SIZE {
                        Some(DiagnosticKind::InvalidLength {
                            length: header.length,
                        })
                    } else {
                        match self.header_check.check(header_bytes, header.hdr_crc) {
                            CrcVerdict::Accepted => {
                                off = self.take_node(data, off, &header, &mut outcome);
                                continue;
                            }
                            CrcVerdict::Mismatch { stored, computed } => {
                                Some(DiagnosticKind::HeaderCrcMismatch { stored, computed })
                            }
                        }
                    }
                }
                _ => None,
            };

            if rejection.is_none() {
                let window = ERASE_WINDOW - (off % ERASE_WINDOW);
                let end = (off + window).min(data.len());
                if data[off..end].iter().all(|&b| b == 0xFF) {
                    outcome.erased_bytes += (end - off) as u64;
                    off += window;
                    continue;
                }
            }

            let kind = rejection.unwrap_or_else(|| DiagnosticKind::BadSignature {
                header: header_bytes.to_vec(),
            });
            let diagnostic = ScanDiagnostic {
                offset: off as u64,
                kind,
            };
            tracing::warn!("jffs2: {}", diagnostic);
            outcome.diagnostics.push(diagnostic);

            off += self.resync_distance(&data[off..]);
        }

        tracing::debug!(
            "jffs2: scanned {} bytes, {} nodes, {} diagnostics, {} erased bytes",
            data.len(),
            outcome.nodes.len(),
            outcome.diagnostics.len(),
            outcome.erased_bytes
        );

        outcome
    }

    fn parse_header(&self, bytes: &[u8]) -> Option<Header> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        let mut reader = FieldReader::new(bytes, self.endianness);
        Some(Header {
            magic: [reader.u8().ok()?, reader.u8().ok()?],
            node_type: reader.u16().ok()?,
            length: reader.u32().ok()?,
            hdr_crc: reader.u32().ok()?,
        })
    }

    /// Record the node at `off` and return the aligned offset after it
    fn take_node<'a>(
        &self,
        data: &'a [u8],
        off: usize,
        header: &Header,
        outcome: &mut ScanOutcome<'a>,
    ) -> usize {
        let declared_end = off.saturating_add(header.length as usize);
        let end = declared_end.min(data.len());

        if declared_end > data.len() {
            let diagnostic = ScanDiagnostic {
                offset: off as u64,
                kind: DiagnosticKind::TruncatedNode {
                    declared: header.length,
                    available: (data.len() - off) as u64,
                },
            };
            tracing::warn!("jffs2: {}", diagnostic);
            outcome.diagnostics.push(diagnostic);
        }

        let mut next = declared_end;
        let mut pad: &'a [u8] = &[];
        if next % 4 != 0 {
            let padlen = 4 - (next % 4);
            let pad_start = next.min(data.len());
            pad = &data[pad_start..(next + padlen).min(data.len())];
            next += padlen;
        }

        outcome.nodes.push(RawNode {
            offset: off as u64,
            node_type: header.node_type,
            length: header.length,
            hdr_crc: header.hdr_crc,
            payload: &data[off + HEADER_SIZE..end],
            pad,
        });

        next
    }

    /// Distance to the next magic within the resync window, or the whole window
    ///
    /// The search starts one byte in so a rejected header at the cursor is
    /// never matched again.
    fn resync_distance(&self, rest: &[u8]) -> usize {
        let window = &rest[..RESYNC_WINDOW.min(rest.len())];
        window
            .get(1..)
            .and_then(|tail| tail.windows(2).position(|pair| pair == NODE_MAGIC))
            .map(|pos| pos + 1)
            .unwrap_or(RESYNC_WINDOW)
    }
}

/// Lowercase hex rendering of raw bytes
pub fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
