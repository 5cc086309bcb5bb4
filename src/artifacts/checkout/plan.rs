//! Plan ops
//!
//! The op alphabet produced by the planner, the post-order fold that orders
//! a subtree's ops, and the scans that collect conflicts and internal
//! errors before any side effect.
//!
//! The fold gives the plan its two ordering guarantees: directories are
//! created before their contents (parent ops are prepended), and contents
//! are deleted before their containing directory (`rmdir` is appended
//! after its children).

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::ObjectId;
use std::path::{Path, PathBuf};

/// One planned operation. Ops are immutable once emitted and owned by the
/// plan list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Mkdir {
        path: PathBuf,
    },
    Rmdir {
        path: PathBuf,
    },
    Create {
        path: PathBuf,
        oid: ObjectId,
        mode: EntryMode,
    },
    /// The workdir content already matches; only the index needs the entry.
    CreateIndex {
        path: PathBuf,
        oid: ObjectId,
        mode: EntryMode,
    },
    Update {
        path: PathBuf,
        oid: ObjectId,
        mode: EntryMode,
        chmod: bool,
    },
    Delete {
        path: PathBuf,
    },
    DeleteIndex {
        path: PathBuf,
    },
    UpdateDirToBlob {
        path: PathBuf,
        oid: ObjectId,
    },
    UpdateBlobToTree {
        path: PathBuf,
    },
    Conflict {
        path: PathBuf,
    },
    Error {
        message: String,
    },
}

impl Op {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Op::Mkdir { path }
            | Op::Rmdir { path }
            | Op::Create { path, .. }
            | Op::CreateIndex { path, .. }
            | Op::Update { path, .. }
            | Op::Delete { path }
            | Op::DeleteIndex { path }
            | Op::UpdateDirToBlob { path, .. }
            | Op::UpdateBlobToTree { path }
            | Op::Conflict { path } => Some(path),
            Op::Error { .. } => None,
        }
    }
}

/// Fold one subtree's results into its parent's. Children arrive already
/// flattened, in lexicographic visit order.
pub fn fold(parent: Option<Op>, mut children: Vec<Op>) -> Vec<Op> {
    match parent {
        None => children,
        // contents must be deleted before their containing directory
        Some(parent @ Op::Rmdir { .. }) => {
            children.push(parent);
            children
        }
        // directories must exist before their contents
        Some(parent) => {
            children.insert(0, parent);
            children
        }
    }
}

/// Every conflicting path in the plan, in plan order.
pub fn conflict_paths(plan: &[Op]) -> Vec<PathBuf> {
    plan.iter()
        .filter_map(|op| match op {
            Op::Conflict { path } => Some(path.clone()),
            _ => None,
        })
        .collect()
}

/// Every internal error message in the plan, in plan order.
pub fn error_messages(plan: &[Op]) -> Vec<String> {
    plan.iter()
        .filter_map(|op| match op {
            Op::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}
