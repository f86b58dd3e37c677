/// Dump detection and module organization
use anyhow::Result;
use std::path::Path;

pub mod common;
pub mod jffs2;

use common::{DumpImage, Endianness};
use jffs2::Jffs2Filesystem;

/// Detect whether a dump holds JFFS2 nodes, and in which byte order
pub fn detect_filesystem(image_path: &Path) -> Result<Option<Endianness>> {
    let image = DumpImage::open(image_path)?;
    Ok(jffs2::detect_endianness(image.bytes()))
}

/// Get human-readable dump information
pub fn get_filesystem_info(fs: &Jffs2Filesystem) -> String {
    let index = fs.index();
    format!(
        "JFFS2 Dump\n\
         - Byte Order: {:?}\n\
         - Image Size: {} bytes\n\
         - Erased: {} bytes\n\
         - Nodes: {}\n\
         - Dirents: {}\n\
         - Data Nodes: {}\n\
         - Root Inodes: {:?}\n\
         - Diagnostics: {}",
        fs.config().endianness,
        fs.image_size(),
        fs.erased_bytes(),
        index.nodes().len(),
        index.dirents().count(),
        index.inodes().count(),
        index.root_inodes(),
        fs.diagnostics().len()
    )
}
