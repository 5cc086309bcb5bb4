//! Tri-walker
//!
//! A synchronized pre-order walk over three sources: the target commit tree
//! (read through the object store), the working directory (listed through
//! the workspace), and the index. Each distinct name in the union yields one
//! [`EntryTriple`]; children are visited in ascending full-path order, so
//! the resulting plan is deterministic.
//!
//! Hashing a working-tree file is the expensive step. Entries therefore
//! carry their oid lazily: [`WalkEntry::populate_hash`] is idempotent and
//! memoized, and only runs when a planner case actually needs the content
//! comparison. Tree-typed workdir entries never receive a hash.

use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::areas::workspace::Workspace;
use crate::artifacts::checkout::pathspec::CheckoutFilter;
use crate::artifacts::checkout::plan::{self, Op};
use crate::artifacts::checkout::planner::Planner;
use crate::artifacts::checkout::progress::{Emitter, PHASE_ANALYZING};
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::{Tree, TreeEntry};
use anyhow::Context;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// What a source holds at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Tree,
    Blob,
    /// A gitlink (submodule) slot.
    Commit,
    /// Sockets, fifos, devices.
    Special,
}

/// One source's view of a single path.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    fullpath: PathBuf,
    kind: Option<EntryKind>,
    mode: Option<EntryMode>,
    oid: Option<ObjectId>,
    stat: Option<EntryMetadata>,
}

impl WalkEntry {
    pub fn absent(fullpath: PathBuf) -> Self {
        WalkEntry {
            fullpath,
            kind: None,
            mode: None,
            oid: None,
            stat: None,
        }
    }

    pub fn from_tree(fullpath: PathBuf, entry: &TreeEntry) -> Self {
        let kind = match entry.mode {
            EntryMode::Directory => EntryKind::Tree,
            EntryMode::Gitlink => EntryKind::Commit,
            _ => EntryKind::Blob,
        };

        WalkEntry {
            fullpath,
            kind: Some(kind),
            mode: Some(entry.mode),
            oid: Some(entry.oid.clone()),
            stat: None,
        }
    }

    pub fn from_stage(fullpath: PathBuf, entry: &IndexEntry) -> Self {
        WalkEntry {
            fullpath,
            kind: Some(EntryKind::Blob),
            mode: Some(entry.metadata.mode),
            oid: Some(entry.oid.clone()),
            stat: Some(entry.metadata.clone()),
        }
    }

    /// The stage holds no entry at this path itself, but tracks files
    /// beneath it.
    pub fn stage_tree(fullpath: PathBuf) -> Self {
        WalkEntry {
            fullpath,
            kind: Some(EntryKind::Tree),
            mode: Some(EntryMode::Directory),
            oid: None,
            stat: None,
        }
    }

    pub fn from_workdir(
        fullpath: PathBuf,
        stat: EntryMetadata,
        file_type: std::fs::FileType,
    ) -> Self {
        let kind = if file_type.is_dir() {
            EntryKind::Tree
        } else if file_type.is_file() || file_type.is_symlink() {
            EntryKind::Blob
        } else {
            EntryKind::Special
        };

        WalkEntry {
            fullpath,
            kind: Some(kind),
            mode: Some(stat.mode),
            oid: None,
            stat: Some(stat),
        }
    }

    pub fn exists(&self) -> bool {
        self.kind.is_some()
    }

    pub fn fullpath(&self) -> &Path {
        &self.fullpath
    }

    pub fn kind(&self) -> Option<EntryKind> {
        self.kind
    }

    /// Normalized mode, where present.
    pub fn mode(&self) -> Option<EntryMode> {
        self.mode
    }

    pub fn stat(&self) -> Option<&EntryMetadata> {
        self.stat.as_ref()
    }

    pub fn oid(&self) -> Option<&ObjectId> {
        self.oid.as_ref()
    }

    /// Idempotent, memoized content hash. Only blob entries are ever
    /// hashed; for sources whose oid is already known this is a lookup.
    pub fn populate_hash(&mut self, workspace: &Workspace) -> anyhow::Result<Option<&ObjectId>> {
        if self.oid.is_none() && self.kind == Some(EntryKind::Blob) {
            let bytes = workspace.read_blob_bytes(&self.fullpath)?;
            self.oid = Some(Blob::new(bytes).object_id()?);
        }

        Ok(self.oid.as_ref())
    }
}

/// The three views of one path. All share the same fullpath; at least one
/// exists.
#[derive(Debug)]
pub struct EntryTriple {
    pub stage: WalkEntry,
    pub commit: WalkEntry,
    pub workdir: WalkEntry,
}

impl EntryTriple {
    pub fn fullpath(&self) -> &Path {
        self.commit.fullpath()
    }
}

pub struct TriWalker<'r> {
    repository: &'r Repository,
    filter: &'r CheckoutFilter,
    planner: Planner<'r>,
    emitter: &'r Emitter,
}

impl<'r> TriWalker<'r> {
    pub fn new(repository: &'r Repository, filter: &'r CheckoutFilter, emitter: &'r Emitter) -> Self {
        TriWalker {
            repository,
            filter,
            planner: Planner::new(repository.workspace()),
            emitter,
        }
    }

    /// Walk the three sources from the root and return the folded plan.
    /// The root entry itself is never mapped.
    pub fn walk(&self, root_tree: Option<&Tree>, index: &Index) -> anyhow::Result<Vec<Op>> {
        self.walk_level(Path::new("."), root_tree, index, true)
    }

    fn walk_level(
        &self,
        dirpath: &Path,
        commit_tree: Option<&Tree>,
        index: &Index,
        workdir_listed: bool,
    ) -> anyhow::Result<Vec<Op>> {
        let at_root = dirpath == Path::new(".");

        let mut names: BTreeSet<String> = BTreeSet::new();
        if let Some(tree) = commit_tree {
            names.extend(tree.entries().map(|(name, _)| name.clone()));
        }
        if workdir_listed {
            names.extend(self.repository.workspace().list_dir_names(dirpath)?);
        }
        names.extend(index.child_names(dirpath));

        let mut ops = Vec::new();

        for name in names {
            let fullpath = if at_root {
                PathBuf::from(&name)
            } else {
                dirpath.join(&name)
            };

            if !self.filter.worth_walking(&fullpath) {
                continue;
            }

            let commit = match commit_tree.and_then(|tree| tree.get(&name)) {
                Some(entry) => WalkEntry::from_tree(fullpath.clone(), entry),
                None => WalkEntry::absent(fullpath.clone()),
            };

            let stage = if let Some(entry) = index.entry_by_path(&fullpath) {
                WalkEntry::from_stage(fullpath.clone(), entry)
            } else if index.is_tracked_dir(&fullpath) {
                WalkEntry::stage_tree(fullpath.clone())
            } else {
                WalkEntry::absent(fullpath.clone())
            };

            let workdir = if workdir_listed {
                match self.repository.workspace().lstat(&fullpath)? {
                    Some((stat, file_type)) => {
                        WalkEntry::from_workdir(fullpath.clone(), stat, file_type)
                    }
                    None => WalkEntry::absent(fullpath.clone()),
                }
            } else {
                WalkEntry::absent(fullpath.clone())
            };

            let commit_is_tree = commit.kind() == Some(EntryKind::Tree);
            let workdir_is_dir = workdir.kind() == Some(EntryKind::Tree);

            let mut triple = EntryTriple {
                stage,
                commit,
                workdir,
            };

            let op = if self.filter.prefix_matches(&fullpath) && self.filter.tail_matches(&fullpath)
            {
                let op = self.planner.classify(&mut triple, index)?;
                self.emitter.tick(PHASE_ANALYZING, None);
                op
            } else {
                None
            };

            // Descend only where something plannable can live below:
            // under commit trees and under stage-tracked directories. A
            // directory present solely in the workdir holds nothing but
            // untracked files, which checkout leaves alone.
            let commit_subtree = if commit_is_tree {
                let oid = triple
                    .commit
                    .oid()
                    .context("commit tree entry without oid")?;
                Some(
                    self.repository
                        .database()
                        .parse_object_as_tree(oid)?
                        .with_context(|| format!("object {oid} is not a tree"))?,
                )
            } else {
                None
            };

            let children = if commit_subtree.is_some() || index.is_tracked_dir(&fullpath) {
                self.walk_level(&fullpath, commit_subtree.as_ref(), index, workdir_is_dir)?
            } else {
                Vec::new()
            };

            ops.extend(plan::fold(op, children));
        }

        Ok(ops)
    }
}
