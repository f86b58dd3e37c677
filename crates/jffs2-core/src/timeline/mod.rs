/// Filesystem activity timeline
///
/// Every data node carries access, change and modify times; every dirent
/// records when a name was bound or unlinked. Binding a fresh name and
/// renaming look the same on flash, so both are reported as renames.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fs::jffs2::index::FilesystemIndex;
use crate::fs::jffs2::nodes::{format_timestamp, DirentNode, InodeNode, Jffs2Node};

/// Kind of timeline event
///
/// Variants are declared alphabetically so event ordering matches the
/// textual action names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineAction {
    Access,
    Create,
    Delete,
    Rename,
    Write,
}

impl std::fmt::Display for TimelineAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimelineAction::Access => write!(f, "access"),
            TimelineAction::Create => write!(f, "create"),
            TimelineAction::Delete => write!(f, "delete"),
            TimelineAction::Rename => write!(f, "rename"),
            TimelineAction::Write => write!(f, "write"),
        }
    }
}

/// One dated event; ordering is by timestamp, then the remaining fields
///
/// Names compare by their on-flash bytes, so distinct names that render
/// the same after lossy decoding stay distinct events.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: u32,
    pub action: TimelineAction,
    pub inode: u32,
    /// Dirent name bytes as stored; empty for data node events
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_name: Vec<u8>,
    /// Empty for data node events
    pub name: String,
    /// 0 for data node events
    pub parent_inode: u32,
}

impl TimelineEvent {
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(i64::from(self.timestamp), 0)
    }

    pub fn time_utc(&self) -> String {
        format_timestamp(self.timestamp)
    }
}

/// Summary counts for a timeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineStatistics {
    pub total_events: usize,
    pub events_by_action: BTreeMap<TimelineAction, usize>,
    pub first_timestamp: Option<u32>,
    pub last_timestamp: Option<u32>,
}

/// Deduplicated, sorted activity timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub events: Vec<TimelineEvent>,
    pub statistics: TimelineStatistics,
}

impl Timeline {
    /// Build the timeline of every node in the index
    pub fn from_index(index: &FilesystemIndex) -> Self {
        Self::from_nodes(index.nodes())
    }

    pub fn from_nodes(nodes: &[Jffs2Node]) -> Self {
        let mut events = Vec::new();
        for node in nodes {
            match node {
                Jffs2Node::Inode(n) => events.extend(inode_events(n)),
                Jffs2Node::Dirent(d) => events.push(dirent_event(d)),
                Jffs2Node::Opaque(_) => {}
            }
        }

        events.sort();
        events.dedup();

        let statistics = Self::calculate_statistics(&events);
        Timeline { events, statistics }
    }

    /// Events of one action kind
    pub fn filter_by_action(&self, action: TimelineAction) -> Vec<&TimelineEvent> {
        self.events.iter().filter(|e| e.action == action).collect()
    }

    /// Events touching `inode`, as data node or as dirent target
    pub fn events_for_inode(&self, inode: u32) -> Vec<&TimelineEvent> {
        self.events.iter().filter(|e| e.inode == inode).collect()
    }

    fn calculate_statistics(events: &[TimelineEvent]) -> TimelineStatistics {
        let mut events_by_action = BTreeMap::new();
        for event in events {
            *events_by_action.entry(event.action).or_insert(0) += 1;
        }
        TimelineStatistics {
            total_events: events.len(),
            events_by_action,
            first_timestamp: events.first().map(|e| e.timestamp),
            last_timestamp: events.last().map(|e| e.timestamp),
        }
    }
}

fn inode_events(node: &InodeNode) -> [TimelineEvent; 3] {
    let event = |timestamp, action| TimelineEvent {
        timestamp,
        action,
        inode: node.ino,
        raw_name: Vec::new(),
        name: String::new(),
        parent_inode: 0,
    };
    [
        event(node.atime, TimelineAction::Access),
        event(node.ctime, TimelineAction::Create),
        event(node.mtime, TimelineAction::Write),
    ]
}

fn dirent_event(node: &DirentNode) -> TimelineEvent {
    let action = if node.is_unlink() {
        TimelineAction::Delete
    } else {
        TimelineAction::Rename
    };
    TimelineEvent {
        timestamp: node.mctime,
        action,
        inode: node.ino,
        raw_name: node.name.clone(),
        name: node.display_name(),
        parent_inode: node.pino,
    }
}
