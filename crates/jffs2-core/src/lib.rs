use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub mod error;
pub mod forensics;
pub mod fs;
pub mod recovery;
pub mod timeline;

pub use error::{DecodeError, Jffs2Error};
pub use fs::common::{DumpImage, Endianness};
pub use fs::jffs2::{
    CompressionMethod, DiagnosticKind, DirentNode, HeaderCheck, InodeNode, Jffs2Filesystem,
    Jffs2Node, NodeKind, OpaqueNode, ScanConfig, ScanDiagnostic,
};
pub use recovery::{
    ChildEntry, EntryKind, FileHistory, FileSnapshot, FlushReason, ReplayEvent, TreeEntry,
    TreeView,
};
pub use timeline::{Timeline, TimelineAction, TimelineEvent, TimelineStatistics};

/// Summary of one scanned dump
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub image_path: PathBuf,
    pub scanned_at: DateTime<Utc>,
    pub endianness: Endianness,
    pub image_size: u64,
    pub erased_bytes: u64,
    pub node_count: usize,
    pub dirent_count: usize,
    pub inode_node_count: usize,
    pub root_inodes: Vec<u32>,
    pub diagnostics: Vec<ScanDiagnostic>,
    pub scan_duration_ms: u64,
}

impl ScanReport {
    pub fn from_filesystem(image_path: &Path, fs: &Jffs2Filesystem, scan_duration_ms: u64) -> Self {
        let index = fs.index();
        ScanReport {
            image_path: image_path.to_path_buf(),
            scanned_at: Utc::now(),
            endianness: fs.config().endianness,
            image_size: fs.image_size(),
            erased_bytes: fs.erased_bytes(),
            node_count: index.nodes().len(),
            dirent_count: index.dirents().count(),
            inode_node_count: index.inodes().count(),
            root_inodes: fs.list_root_inodes(),
            diagnostics: fs.diagnostics().to_vec(),
            scan_duration_ms,
        }
    }
}

/// Main scanning function
pub fn scan_image(image_path: &Path, config: ScanConfig) -> Result<Jffs2Filesystem> {
    tracing::info!(
        "Starting scan of {} ({:?} endian)",
        image_path.display(),
        config.endianness
    );
    Jffs2Filesystem::open(image_path, config)
        .with_context(|| format!("scanning {}", image_path.display()))
}

/// Scan a dump and summarize what was found
pub fn scan_and_report(image_path: &Path, config: ScanConfig) -> Result<(Jffs2Filesystem, ScanReport)> {
    let started = Instant::now();
    let fs = scan_image(image_path, config)?;
    let report = ScanReport::from_filesystem(image_path, &fs, started.elapsed().as_millis() as u64);

    tracing::info!(
        "Scan complete: {} nodes, {} dirents, {} data nodes, {} diagnostics",
        report.node_count,
        report.dirent_count,
        report.inode_node_count,
        report.diagnostics.len()
    );

    Ok((fs, report))
}
