//! Checkout planner
//!
//! Classifies each walked entry by the 3-bit presence key
//! `(stage.exists, commit.exists, workdir.exists)` and emits at most one
//! plan op. The single match on the triple is deliberate: it keeps the
//! eight cases exhaustive and each cell independently testable.
//!
//! Conflicts are emitted wherever applying the plan would destroy unsaved
//! local information; they are reported, never resolved.

use crate::areas::index::Index;
use crate::areas::workspace::Workspace;
use crate::artifacts::checkout::plan::Op;
use crate::artifacts::checkout::walker::{EntryKind, EntryTriple};
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use std::path::Path;

pub struct Planner<'r> {
    workspace: &'r Workspace,
}

impl<'r> Planner<'r> {
    pub fn new(workspace: &'r Workspace) -> Self {
        Planner { workspace }
    }

    /// At most one op per entry. `None` means the entry needs nothing.
    pub fn classify(&self, triple: &mut EntryTriple, index: &Index) -> anyhow::Result<Option<Op>> {
        let key = (
            triple.stage.exists(),
            triple.commit.exists(),
            triple.workdir.exists(),
        );

        match key {
            // unreachable by construction: the walker only yields names
            // present in at least one source
            (false, false, false) => Ok(None),
            // untracked workdir file: leave it alone
            (false, false, true) => Ok(None),
            // new in the commit, nothing else
            (false, true, false) => self.plan_fresh_create(triple),
            // new in the commit, the workdir already has something
            (false, true, true) => self.plan_create_over_existing(triple),
            // staged, gone from both commit and workdir
            (true, false, false) => Ok(Some(Op::DeleteIndex {
                path: triple.fullpath().to_path_buf(),
            })),
            // removed in the commit
            (true, false, true) => self.plan_removal(triple),
            // modified (workdir-missing is treated the same way)
            (true, true, _) => self.plan_update(triple, index),
        }
    }

    fn plan_fresh_create(&self, triple: &mut EntryTriple) -> anyhow::Result<Option<Op>> {
        let path = triple.fullpath().to_path_buf();

        match triple.commit.kind() {
            Some(EntryKind::Tree) => Ok(Some(Op::Mkdir { path })),
            Some(EntryKind::Blob) => {
                let oid = commit_oid(triple)?;
                let mode = commit_mode(triple)?;
                Ok(Some(Op::Create { path, oid, mode }))
            }
            Some(EntryKind::Commit) => {
                tracing::debug!(path = %path.display(), "submodules are unsupported; skipping gitlink");
                Ok(None)
            }
            _ => Ok(Some(Op::Error {
                message: format!("unexpected commit entry type at {}", path.display()),
            })),
        }
    }

    fn plan_create_over_existing(&self, triple: &mut EntryTriple) -> anyhow::Result<Option<Op>> {
        let path = triple.fullpath().to_path_buf();

        match (triple.commit.kind(), triple.workdir.kind()) {
            (Some(EntryKind::Tree), Some(EntryKind::Tree)) => Ok(None),
            (Some(EntryKind::Tree), Some(EntryKind::Blob))
            | (Some(EntryKind::Blob), Some(EntryKind::Tree)) => Ok(Some(Op::Conflict { path })),
            (Some(EntryKind::Blob), Some(EntryKind::Blob)) => {
                let oid = commit_oid(triple)?;
                let mode = commit_mode(triple)?;
                let workdir_oid = triple.workdir.populate_hash(self.workspace)?;

                if workdir_oid != Some(&oid) {
                    return Ok(Some(Op::Conflict { path }));
                }
                if triple.workdir.mode() != Some(mode) {
                    return Ok(Some(Op::Conflict { path }));
                }

                // content already matches; only the index needs an entry
                Ok(Some(Op::CreateIndex { path, oid, mode }))
            }
            (Some(EntryKind::Commit), Some(EntryKind::Tree)) => {
                tracing::debug!(path = %path.display(), "submodules are unsupported; skipping gitlink");
                Ok(None)
            }
            // a file occupies the submodule slot
            (Some(EntryKind::Commit), Some(EntryKind::Blob)) => Ok(Some(Op::Conflict { path })),
            _ => Ok(Some(Op::Error {
                message: format!("unexpected entry types at {}", path.display()),
            })),
        }
    }

    fn plan_removal(&self, triple: &mut EntryTriple) -> anyhow::Result<Option<Op>> {
        let path = triple.fullpath().to_path_buf();

        match triple.stage.kind() {
            Some(EntryKind::Tree) => Ok(Some(Op::Rmdir { path })),
            Some(EntryKind::Blob) => {
                let stage_oid = triple
                    .stage
                    .oid()
                    .cloned()
                    .context("stage entry without oid")?;
                // hash whatever occupies the path; a type mismatch simply
                // fails the comparison and surfaces as a conflict
                let workdir_oid = triple.workdir.populate_hash(self.workspace)?;

                if workdir_oid != Some(&stage_oid) {
                    // refuse to lose local edits
                    Ok(Some(Op::Conflict { path }))
                } else {
                    Ok(Some(Op::Delete { path }))
                }
            }
            _ => Ok(Some(Op::Error {
                message: format!("unexpected stage entry type at {}", path.display()),
            })),
        }
    }

    fn plan_update(&self, triple: &mut EntryTriple, index: &Index) -> anyhow::Result<Option<Op>> {
        let path = triple.fullpath().to_path_buf();

        match (triple.stage.kind(), triple.commit.kind()) {
            (Some(EntryKind::Tree), Some(EntryKind::Tree)) => Ok(None),
            (Some(EntryKind::Blob), Some(EntryKind::Blob)) => {
                let commit_oid = commit_oid(triple)?;
                let commit_mode = commit_mode(triple)?;
                let stage_oid = triple
                    .stage
                    .oid()
                    .cloned()
                    .context("stage entry without oid")?;
                let stage_mode = triple.stage.mode().context("stage entry without mode")?;

                if triple.workdir.exists() {
                    let workdir_oid = triple.workdir.populate_hash(self.workspace)?;
                    // broader than canonical git, which compares only
                    // against the stage: a workdir already matching the
                    // incoming commit is tolerated
                    if workdir_oid != Some(&stage_oid) && workdir_oid != Some(&commit_oid) {
                        return Ok(Some(Op::Conflict { path }));
                    }
                }

                if commit_mode != stage_mode {
                    Ok(Some(Op::Update {
                        path,
                        oid: commit_oid,
                        mode: commit_mode,
                        chmod: true,
                    }))
                } else if commit_oid != stage_oid {
                    Ok(Some(Op::Update {
                        path,
                        oid: commit_oid,
                        mode: commit_mode,
                        chmod: false,
                    }))
                } else {
                    Ok(None)
                }
            }
            (Some(EntryKind::Tree), Some(EntryKind::Blob)) => {
                // replacing the directory must not wipe untracked files
                // hidden inside it
                if triple.workdir.kind() == Some(EntryKind::Tree)
                    && self.has_untracked_residue(&path, index)?
                {
                    return Ok(Some(Op::Conflict { path }));
                }

                Ok(Some(Op::UpdateDirToBlob {
                    path,
                    oid: commit_oid(triple)?,
                }))
            }
            (Some(EntryKind::Blob), Some(EntryKind::Tree)) => {
                Ok(Some(Op::UpdateBlobToTree { path }))
            }
            _ => Ok(Some(Op::Error {
                message: format!("unexpected entry types at {}", path.display()),
            })),
        }
    }

    /// True when the physical directory holds anything the stage does not
    /// track. Tracked children are conflict-checked individually during
    /// the walk; untracked ones would otherwise vanish with the directory.
    fn has_untracked_residue(&self, dir: &Path, index: &Index) -> anyhow::Result<bool> {
        for name in self.workspace.list_dir_names(dir)? {
            let child = dir.join(&name);
            let Some((_, file_type)) = self.workspace.lstat(&child)? else {
                continue;
            };

            if file_type.is_dir() {
                if !index.is_tracked_dir(&child) || self.has_untracked_residue(&child, index)? {
                    return Ok(true);
                }
            } else if index.entry_by_path(&child).is_none() {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

fn commit_oid(triple: &EntryTriple) -> anyhow::Result<ObjectId> {
    triple
        .commit
        .oid()
        .cloned()
        .context("commit entry without oid")
}

fn commit_mode(triple: &EntryTriple) -> anyhow::Result<EntryMode> {
    triple.commit.mode().context("commit entry without mode")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::checkout::walker::WalkEntry;
    use crate::artifacts::index::entry_mode::FileMode;
    use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
    use crate::artifacts::objects::blob::Blob;
    use crate::artifacts::objects::object::Object;
    use crate::artifacts::objects::tree::TreeEntry;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use bytes::Bytes;
    use rstest::rstest;
    use std::path::{Path, PathBuf};

    fn workspace_in(temp: &TempDir) -> Workspace {
        Workspace::new(
            temp.path().to_path_buf().into_boxed_path(),
            temp.path().join(".git").into_boxed_path(),
        )
    }

    fn empty_index() -> Index {
        Index::new(PathBuf::from("/tmp/never-written").into_boxed_path())
    }

    fn blob_oid(content: &str) -> ObjectId {
        Blob::new(Bytes::from(content.to_string()))
            .object_id()
            .unwrap()
    }

    fn tree_side(path: &str, oid: &ObjectId, mode: EntryMode) -> WalkEntry {
        WalkEntry::from_tree(PathBuf::from(path), &TreeEntry::new(oid.clone(), mode))
    }

    fn stage_side(path: &str, oid: &ObjectId, mode: EntryMode) -> WalkEntry {
        let metadata = EntryMetadata {
            mode,
            ..Default::default()
        };
        WalkEntry::from_stage(
            PathBuf::from(path),
            &IndexEntry::new(PathBuf::from(path), oid.clone(), metadata),
        )
    }

    fn workdir_side(workspace: &Workspace, path: &str) -> WalkEntry {
        let (stat, file_type) = workspace.lstat(Path::new(path)).unwrap().unwrap();
        WalkEntry::from_workdir(PathBuf::from(path), stat, file_type)
    }

    fn absent(path: &str) -> WalkEntry {
        WalkEntry::absent(PathBuf::from(path))
    }

    #[rstest]
    fn untracked_workdir_files_are_left_alone() {
        let temp = TempDir::new().unwrap();
        temp.child("stray.txt").write_str("stray").unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);

        let mut triple = EntryTriple {
            stage: absent("stray.txt"),
            commit: absent("stray.txt"),
            workdir: workdir_side(&workspace, "stray.txt"),
        };

        assert!(planner.classify(&mut triple, &empty_index()).unwrap().is_none());
    }

    #[rstest]
    fn fresh_commit_blob_becomes_a_create() {
        let temp = TempDir::new().unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);
        let oid = blob_oid("hello\n");

        let mut triple = EntryTriple {
            stage: absent("a"),
            commit: tree_side("a", &oid, EntryMode::File(FileMode::Regular)),
            workdir: absent("a"),
        };

        pretty_assertions::assert_eq!(
            planner.classify(&mut triple, &empty_index()).unwrap(),
            Some(Op::Create {
                path: PathBuf::from("a"),
                oid,
                mode: EntryMode::File(FileMode::Regular),
            })
        );
    }

    #[rstest]
    fn fresh_commit_tree_becomes_a_mkdir() {
        let temp = TempDir::new().unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);
        let oid = blob_oid("subtree");

        let mut triple = EntryTriple {
            stage: absent("d"),
            commit: tree_side("d", &oid, EntryMode::Directory),
            workdir: absent("d"),
        };

        pretty_assertions::assert_eq!(
            planner.classify(&mut triple, &empty_index()).unwrap(),
            Some(Op::Mkdir {
                path: PathBuf::from("d"),
            })
        );
    }

    #[rstest]
    fn gitlinks_are_skipped_with_a_diagnostic() {
        let temp = TempDir::new().unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);
        let oid = blob_oid("submodule commit");

        let mut triple = EntryTriple {
            stage: absent("vendored"),
            commit: tree_side("vendored", &oid, EntryMode::Gitlink),
            workdir: absent("vendored"),
        };

        assert!(planner.classify(&mut triple, &empty_index()).unwrap().is_none());
    }

    #[rstest]
    fn stage_only_entries_drop_out_of_the_index() {
        let temp = TempDir::new().unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);
        let oid = blob_oid("gone");

        let mut triple = EntryTriple {
            stage: stage_side("gone.txt", &oid, EntryMode::File(FileMode::Regular)),
            commit: absent("gone.txt"),
            workdir: absent("gone.txt"),
        };

        pretty_assertions::assert_eq!(
            planner.classify(&mut triple, &empty_index()).unwrap(),
            Some(Op::DeleteIndex {
                path: PathBuf::from("gone.txt"),
            })
        );
    }

    #[rstest]
    fn matching_workdir_content_needs_only_an_index_entry() {
        let temp = TempDir::new().unwrap();
        temp.child("same.txt").write_str("identical").unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);
        let oid = blob_oid("identical");

        let mut triple = EntryTriple {
            stage: absent("same.txt"),
            commit: tree_side("same.txt", &oid, EntryMode::File(FileMode::Regular)),
            workdir: workdir_side(&workspace, "same.txt"),
        };

        pretty_assertions::assert_eq!(
            planner.classify(&mut triple, &empty_index()).unwrap(),
            Some(Op::CreateIndex {
                path: PathBuf::from("same.txt"),
                oid,
                mode: EntryMode::File(FileMode::Regular),
            })
        );
    }

    #[rstest]
    fn differing_workdir_content_conflicts_instead_of_overwriting() {
        let temp = TempDir::new().unwrap();
        temp.child("dirty.txt").write_str("local edits").unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);
        let oid = blob_oid("incoming");

        let mut triple = EntryTriple {
            stage: absent("dirty.txt"),
            commit: tree_side("dirty.txt", &oid, EntryMode::File(FileMode::Regular)),
            workdir: workdir_side(&workspace, "dirty.txt"),
        };

        pretty_assertions::assert_eq!(
            planner.classify(&mut triple, &empty_index()).unwrap(),
            Some(Op::Conflict {
                path: PathBuf::from("dirty.txt"),
            })
        );
    }

    #[rstest]
    fn clean_removal_deletes_dirty_removal_conflicts() {
        let temp = TempDir::new().unwrap();
        temp.child("old.txt").write_str("committed").unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);
        let stage_oid = blob_oid("committed");

        let mut clean = EntryTriple {
            stage: stage_side("old.txt", &stage_oid, EntryMode::File(FileMode::Regular)),
            commit: absent("old.txt"),
            workdir: workdir_side(&workspace, "old.txt"),
        };
        pretty_assertions::assert_eq!(
            planner.classify(&mut clean, &empty_index()).unwrap(),
            Some(Op::Delete {
                path: PathBuf::from("old.txt"),
            })
        );

        temp.child("old.txt").write_str("local edits").unwrap();
        let mut dirty = EntryTriple {
            stage: stage_side("old.txt", &stage_oid, EntryMode::File(FileMode::Regular)),
            commit: absent("old.txt"),
            workdir: workdir_side(&workspace, "old.txt"),
        };
        pretty_assertions::assert_eq!(
            planner.classify(&mut dirty, &empty_index()).unwrap(),
            Some(Op::Conflict {
                path: PathBuf::from("old.txt"),
            })
        );
    }

    #[rstest]
    fn content_change_updates_without_chmod() {
        let temp = TempDir::new().unwrap();
        temp.child("f.txt").write_str("old content").unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);
        let old_oid = blob_oid("old content");
        let new_oid = blob_oid("new content");

        let mut triple = EntryTriple {
            stage: stage_side("f.txt", &old_oid, EntryMode::File(FileMode::Regular)),
            commit: tree_side("f.txt", &new_oid, EntryMode::File(FileMode::Regular)),
            workdir: workdir_side(&workspace, "f.txt"),
        };

        pretty_assertions::assert_eq!(
            planner.classify(&mut triple, &empty_index()).unwrap(),
            Some(Op::Update {
                path: PathBuf::from("f.txt"),
                oid: new_oid,
                mode: EntryMode::File(FileMode::Regular),
                chmod: false,
            })
        );
    }

    #[rstest]
    fn mode_change_updates_with_chmod() {
        let temp = TempDir::new().unwrap();
        temp.child("run.sh").write_str("#!/bin/sh\n").unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);
        let oid = blob_oid("#!/bin/sh\n");

        let mut triple = EntryTriple {
            stage: stage_side("run.sh", &oid, EntryMode::File(FileMode::Regular)),
            commit: tree_side("run.sh", &oid, EntryMode::File(FileMode::Executable)),
            workdir: workdir_side(&workspace, "run.sh"),
        };

        pretty_assertions::assert_eq!(
            planner.classify(&mut triple, &empty_index()).unwrap(),
            Some(Op::Update {
                path: PathBuf::from("run.sh"),
                oid,
                mode: EntryMode::File(FileMode::Executable),
                chmod: true,
            })
        );
    }

    #[rstest]
    fn workdir_matching_the_incoming_commit_is_tolerated() {
        let temp = TempDir::new().unwrap();
        temp.child("f.txt").write_str("new content").unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);
        let old_oid = blob_oid("old content");
        let new_oid = blob_oid("new content");

        let mut triple = EntryTriple {
            stage: stage_side("f.txt", &old_oid, EntryMode::File(FileMode::Regular)),
            commit: tree_side("f.txt", &new_oid, EntryMode::File(FileMode::Regular)),
            workdir: workdir_side(&workspace, "f.txt"),
        };

        pretty_assertions::assert_eq!(
            planner.classify(&mut triple, &empty_index()).unwrap(),
            Some(Op::Update {
                path: PathBuf::from("f.txt"),
                oid: new_oid,
                mode: EntryMode::File(FileMode::Regular),
                chmod: false,
            })
        );
    }

    #[rstest]
    fn third_party_workdir_content_conflicts_on_update() {
        let temp = TempDir::new().unwrap();
        temp.child("f.txt").write_str("unsaved edits").unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);
        let old_oid = blob_oid("old content");
        let new_oid = blob_oid("new content");

        let mut triple = EntryTriple {
            stage: stage_side("f.txt", &old_oid, EntryMode::File(FileMode::Regular)),
            commit: tree_side("f.txt", &new_oid, EntryMode::File(FileMode::Regular)),
            workdir: workdir_side(&workspace, "f.txt"),
        };

        pretty_assertions::assert_eq!(
            planner.classify(&mut triple, &empty_index()).unwrap(),
            Some(Op::Conflict {
                path: PathBuf::from("f.txt"),
            })
        );
    }

    #[rstest]
    fn stage_tree_to_commit_blob_swaps_directory_for_file() {
        let temp = TempDir::new().unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);
        let oid = blob_oid("now a file");

        let mut triple = EntryTriple {
            stage: WalkEntry::stage_tree(PathBuf::from("p")),
            commit: tree_side("p", &oid, EntryMode::File(FileMode::Regular)),
            workdir: absent("p"),
        };

        pretty_assertions::assert_eq!(
            planner.classify(&mut triple, &empty_index()).unwrap(),
            Some(Op::UpdateDirToBlob {
                path: PathBuf::from("p"),
                oid,
            })
        );
    }

    #[rstest]
    fn untracked_residue_blocks_a_directory_to_blob_swap() {
        let temp = TempDir::new().unwrap();
        temp.child("p/tracked.txt").write_str("tracked").unwrap();
        temp.child("p/scratch.txt").write_str("never staged").unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);

        let mut index = empty_index();
        index.add(IndexEntry::new(
            PathBuf::from("p/tracked.txt"),
            blob_oid("tracked"),
            EntryMetadata::default(),
        ));

        let oid = blob_oid("now a file");
        let mut triple = EntryTriple {
            stage: WalkEntry::stage_tree(PathBuf::from("p")),
            commit: tree_side("p", &oid, EntryMode::File(FileMode::Regular)),
            workdir: workdir_side(&workspace, "p"),
        };

        pretty_assertions::assert_eq!(
            planner.classify(&mut triple, &index).unwrap(),
            Some(Op::Conflict {
                path: PathBuf::from("p"),
            })
        );
    }

    #[rstest]
    fn fully_tracked_directory_swaps_to_a_blob() {
        let temp = TempDir::new().unwrap();
        temp.child("p/tracked.txt").write_str("tracked").unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);

        let mut index = empty_index();
        index.add(IndexEntry::new(
            PathBuf::from("p/tracked.txt"),
            blob_oid("tracked"),
            EntryMetadata::default(),
        ));

        let oid = blob_oid("now a file");
        let mut triple = EntryTriple {
            stage: WalkEntry::stage_tree(PathBuf::from("p")),
            commit: tree_side("p", &oid, EntryMode::File(FileMode::Regular)),
            workdir: workdir_side(&workspace, "p"),
        };

        pretty_assertions::assert_eq!(
            planner.classify(&mut triple, &index).unwrap(),
            Some(Op::UpdateDirToBlob {
                path: PathBuf::from("p"),
                oid,
            })
        );
    }

    #[rstest]
    fn stage_blob_to_commit_tree_swaps_file_for_directory() {
        let temp = TempDir::new().unwrap();
        let workspace = workspace_in(&temp);
        let planner = Planner::new(&workspace);
        let blob = blob_oid("was a file");
        let subtree = blob_oid("a subtree");

        let mut triple = EntryTriple {
            stage: stage_side("p", &blob, EntryMode::File(FileMode::Regular)),
            commit: tree_side("p", &subtree, EntryMode::Directory),
            workdir: absent("p"),
        };

        pretty_assertions::assert_eq!(
            planner.classify(&mut triple, &empty_index()).unwrap(),
            Some(Op::UpdateBlobToTree {
                path: PathBuf::from("p"),
            })
        );
    }
}
