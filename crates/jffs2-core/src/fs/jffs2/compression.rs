/// Node payload decompression
///
/// Each inode node names the method its data was compressed with. Methods
/// 0 (none), 6 (zlib) and 8 (the OpenWrt LZMA variant) are decoded; every
/// other method is passed through untouched with a diagnostic.
use flate2::read::DeflateDecoder;
use lzma_rs::decompress::{Options, Stream, UnpackedSize};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

use super::nodes::InodeNode;
use crate::error::DecodeError;

/// Compression method tag of an inode node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompressionMethod {
    None,
    Zero,
    Rtime,
    RubinMips,
    Copy,
    DynRubin,
    Zlib,
    Lzo,
    Lzma,
    Unknown(u8),
}

impl CompressionMethod {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Self::None,
            1 => Self::Zero,
            2 => Self::Rtime,
            3 => Self::RubinMips,
            4 => Self::Copy,
            5 => Self::DynRubin,
            6 => Self::Zlib,
            7 => Self::Lzo,
            8 => Self::Lzma,
            other => Self::Unknown(other),
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Zero => 1,
            Self::Rtime => 2,
            Self::RubinMips => 3,
            Self::Copy => 4,
            Self::DynRubin => 5,
            Self::Zlib => 6,
            Self::Lzo => 7,
            Self::Lzma => 8,
            Self::Unknown(tag) => *tag,
        }
    }
}

/// A payload decoder for one compression method
pub trait Decompressor: Send + Sync {
    /// Decode `data`, which should expand to `expected_len` bytes.
    /// Output larger than `limit` is an error.
    fn decompress(&self, data: &[u8], expected_len: usize, limit: u64)
        -> Result<Vec<u8>, DecodeError>;
}

/// Method 0
pub struct Uncompressed;

impl Decompressor for Uncompressed {
    fn decompress(&self, data: &[u8], _expected_len: usize, _limit: u64) -> Result<Vec<u8>, DecodeError> {
        Ok(data.to_vec())
    }
}

/// Method 6: deflate, with or without the 2-byte zlib header
pub struct ZlibCodec;

impl ZlibCodec {
    /// Whether `data` opens with a zlib container header
    pub fn has_zlib_header(data: &[u8]) -> bool {
        if data.len() <= 2 {
            return false;
        }
        let (b0, b1) = (data[0], data[1]);
        (b1 & 0x20) == 0 && (b0 & 0x0f) == 8 && ((u16::from(b0) << 8) | u16::from(b1)) % 31 == 0
    }
}

impl Decompressor for ZlibCodec {
    fn decompress(&self, data: &[u8], _expected_len: usize, limit: u64) -> Result<Vec<u8>, DecodeError> {
        let body = if Self::has_zlib_header(data) {
            &data[2..]
        } else {
            data
        };

        let mut out = Vec::new();
        DeflateDecoder::new(body)
            .take(limit.saturating_add(1))
            .read_to_end(&mut out)
            .map_err(DecodeError::Inflate)?;

        if out.len() as u64 > limit {
            return Err(DecodeError::OutputTooLarge { limit });
        }
        Ok(out)
    }
}

/// Method 8: headerless LZMA1 stream
///
/// Parameters follow the OpenWrt JFFS2 LZMA patch: lc=0, lp=0, pb=0 and an
/// 8 KiB dictionary.
pub struct LzmaCodec;

impl LzmaCodec {
    pub const DICT_SIZE: u32 = 8192;

    /// Properties byte and dictionary size, the prefix the stream decoder expects
    fn stream_header() -> [u8; 5] {
        let (lc, lp, pb) = (0u8, 0u8, 0u8);
        let mut header = [0u8; 5];
        header[0] = (pb * 5 + lp) * 9 + lc;
        header[1..].copy_from_slice(&Self::DICT_SIZE.to_le_bytes());
        header
    }
}

/// Output sink that refuses to grow past `limit` bytes
struct BoundedSink<'a> {
    out: &'a mut Vec<u8>,
    limit: u64,
}

impl Write for BoundedSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.extend_from_slice(buf);
        if self.out.len() as u64 > self.limit {
            return Err(io::Error::new(io::ErrorKind::Other, "decoded output over limit"));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Decompressor for LzmaCodec {
    /// Decode the whole stream, with or without an end marker
    ///
    /// The node's `dsize` only drives the padding trim; the decoded length is
    /// bounded by `limit` alone.
    fn decompress(&self, data: &[u8], expected_len: usize, limit: u64) -> Result<Vec<u8>, DecodeError> {
        let options = Options {
            unpacked_size: UnpackedSize::UseProvided(None),
            memlimit: None,
            allow_incomplete: true,
        };
        let mut out = Vec::new();
        let result = {
            let sink = BoundedSink { out: &mut out, limit };
            let mut stream = Stream::new_with_options(&options, sink);
            let mut framed = Self::stream_header().to_vec();
            framed.extend_from_slice(data);
            match stream.write_all(&framed) {
                Ok(()) => stream.finish().map(|_| ()).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            }
        };

        if out.len() as u64 > limit {
            return Err(DecodeError::OutputTooLarge { limit });
        }
        result.map_err(DecodeError::Lzma)?;

        trim_zero_padding(&mut out, expected_len);
        Ok(out)
    }
}

/// Drop trailing bytes past `expected_len` when they are all zero
///
/// Some encoders pad the stream; the padding decodes to NULs.
pub fn trim_zero_padding(out: &mut Vec<u8>, expected_len: usize) {
    if out.len() > expected_len && out[expected_len..].iter().all(|&b| b == 0) {
        out.truncate(expected_len);
    }
}

static UNCOMPRESSED: Uncompressed = Uncompressed;
static ZLIB: ZlibCodec = ZlibCodec;
static LZMA: LzmaCodec = LzmaCodec;

/// The decoder for `method`, if this crate supports it
pub fn codec_for(method: CompressionMethod) -> Option<&'static dyn Decompressor> {
    match method {
        CompressionMethod::None => Some(&UNCOMPRESSED),
        CompressionMethod::Zlib => Some(&ZLIB),
        CompressionMethod::Lzma => Some(&LZMA),
        _ => None,
    }
}

/// Decompressed node data, possibly with the reason it is raw
#[derive(Debug)]
pub struct Decompressed {
    pub data: Vec<u8>,
    /// Set when `data` is the raw payload because decoding was impossible
    pub error: Option<DecodeError>,
}

/// Decompress an inode node's payload, falling back to its raw bytes
pub fn decompress_node(node: &InodeNode, limit: u64) -> Decompressed {
    let method = CompressionMethod::from_tag(node.compr);
    let Some(codec) = codec_for(method) else {
        tracing::warn!(
            "jffs2: unsupported compression method {} ({:?}) in inode {} version {}",
            node.compr,
            method,
            node.ino,
            node.version
        );
        return Decompressed {
            data: node.data.clone(),
            error: Some(DecodeError::Unsupported(node.compr)),
        };
    };

    match codec.decompress(&node.data, node.dsize as usize, limit) {
        Ok(data) => Decompressed { data, error: None },
        Err(e) => {
            tracing::warn!(
                "jffs2: inode {} version {} at 0x{:X}: {}",
                node.ino,
                node.version,
                node.offset,
                e
            );
            Decompressed {
                data: node.data.clone(),
                error: Some(e),
            }
        }
    }
}
