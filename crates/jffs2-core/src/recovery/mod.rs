/// Reconstruction of filesystem state from the node index
pub mod history;
pub mod tree;

pub use history::{
    all_file_histories, file_history, inode_names, replay_nodes, FileHistory, FileSnapshot,
    FlushReason, ReplayEvent,
};
pub use tree::{list_children, live_inodes, ChildEntry, EntryKind, TreeEntry, TreeView};
