/// Error types for dump scanning and reconstruction
///
/// Almost nothing is fatal while reading a damaged flash dump: corruption,
/// unsupported compression and broken payloads become diagnostics. The
/// variants here are the conditions that are surfaced to the caller.
use thiserror::Error;

/// Fatal conditions surfaced by the core
#[derive(Debug, Error)]
pub enum Jffs2Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dump image is empty")]
    EmptyImage,

    #[error("inode {0} has no data nodes in this dump")]
    UnknownInode(u32),

    /// A node asked the reconstructor to grow a file past the configured bound.
    #[error("inode {inode}: reconstruction needs {requested} bytes, limit is {limit}")]
    FileTooLarge {
        inode: u32,
        requested: u64,
        limit: u64,
    },
}

/// Per-node decompression failure
///
/// Never aborts a scan: the history reconstructor records it and keeps
/// the raw payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("inflate failed: {0}")]
    Inflate(#[source] std::io::Error),

    #[error("lzma decode failed: {0}")]
    Lzma(String),

    #[error("decompressed output exceeds {limit} bytes")]
    OutputTooLarge { limit: u64 },

    #[error("unsupported compression method {0}")]
    Unsupported(u8),
}

pub type Result<T> = std::result::Result<T, Jffs2Error>;
