//! Plan applier
//!
//! Executes a checkout plan in four strictly sequenced phases:
//!
//! 1. deletions (parallel): workdir removals plus index deletions,
//! 2. rmdirs (strictly sequential, in plan order, innermost first),
//! 3. mkdirs (parallel),
//! 4. creates/updates (parallel, best effort).
//!
//! The index is mutated only inside the two exclusive critical sections,
//! around phases 1 and 4; each section rehydrates the index before touching
//! it and persists it on the way out. Phases 1–3 abort on failure; phase 4
//! logs per-op failures and keeps going, so one unwritable file does not
//! stop a large checkout.

use crate::areas::repository::Repository;
use crate::artifacts::checkout::plan::Op;
use crate::artifacts::checkout::progress::{Emitter, PHASE_UPDATING};
use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};

/// Bound on concurrently outstanding filesystem ops within a phase.
const APPLY_FANOUT: usize = 8;

/// A materialized entry ready for `index.add`.
type StagedEntry = (PathBuf, ObjectId, EntryMode, EntryMetadata);

pub struct Applier<'r> {
    repository: &'r Repository,
    emitter: Emitter,
    /// Op count reported as the progress total.
    total: usize,
}

impl<'r> Applier<'r> {
    pub fn new(repository: &'r Repository, emitter: Emitter, total: usize) -> Self {
        Applier {
            repository,
            emitter,
            total,
        }
    }

    pub async fn apply(&self, plan: &[Op]) -> anyhow::Result<()> {
        self.delete_phase(plan).await?;
        self.rmdir_phase(plan).await?;
        self.mkdir_phase(plan).await?;
        self.create_phase(plan).await
    }

    /// Phase 1: `delete` removes the workdir file and the index entry;
    /// `delete-index` touches only the index. Removals run in parallel;
    /// entries whose removal succeeded are recorded in the index even when
    /// a sibling fails, so the persisted index reflects the completed
    /// subset.
    async fn delete_phase(&self, plan: &[Op]) -> anyhow::Result<()> {
        let deletions: Vec<&Op> = plan
            .iter()
            .filter(|op| matches!(op, Op::Delete { .. } | Op::DeleteIndex { .. }))
            .collect();
        if deletions.is_empty() {
            return Ok(());
        }

        let index_arc = self.repository.index();
        let mut index = index_arc.lock().await;
        index.rehydrate()?;

        let workspace = self.repository.workspace();
        let results: Vec<(&Op, anyhow::Result<()>)> = stream::iter(deletions.iter().map(|op| {
            let op = *op;
            async move {
                let result = match op {
                    Op::Delete { path } => workspace
                        .remove_file(path)
                        .await
                        .with_context(|| format!("unable to remove {:?}", path)),
                    _ => Ok(()),
                };
                (op, result)
            }
        }))
        .buffer_unordered(APPLY_FANOUT)
        .collect()
        .await;

        let mut first_failure = None;
        for (op, result) in results {
            match result {
                Ok(()) => {
                    if let Op::Delete { path } | Op::DeleteIndex { path } = op {
                        index.remove(path.clone());
                    }
                    self.emitter.tick(PHASE_UPDATING, Some(self.total));
                }
                Err(error) => first_failure = first_failure.or(Some(error)),
            }
        }

        index.write_updates()?;

        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Phase 2: strictly in plan order, which the reducer arranged
    /// innermost first. A non-empty directory is logged and skipped; any
    /// other failure propagates.
    async fn rmdir_phase(&self, plan: &[Op]) -> anyhow::Result<()> {
        let workspace = self.repository.workspace();

        for op in plan {
            let Op::Rmdir { path } = op else { continue };

            match workspace.remove_dir(path).await {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::DirectoryNotEmpty => {
                    tracing::warn!(path = %path.display(), "directory not empty; leaving in place");
                }
                Err(error) => {
                    return Err(error)
                        .with_context(|| format!("unable to remove directory {:?}", path));
                }
            }

            self.emitter.tick(PHASE_UPDATING, Some(self.total));
        }

        Ok(())
    }

    /// Phase 3: directory creations, plus blob-to-tree swaps (the old file
    /// must give way before anything lands inside the new directory in
    /// phase 4).
    async fn mkdir_phase(&self, plan: &[Op]) -> anyhow::Result<()> {
        let workspace = self.repository.workspace();
        let dir_ops = plan
            .iter()
            .filter(|op| matches!(op, Op::Mkdir { .. } | Op::UpdateBlobToTree { .. }));

        let results: Vec<anyhow::Result<()>> = stream::iter(dir_ops.map(|op| async move {
            match op {
                Op::Mkdir { path } => workspace.make_dir(path).await?,
                Op::UpdateBlobToTree { path } => {
                    workspace.remove_file_if_exists(path).await?;
                    workspace.make_dir(path).await?;
                }
                _ => unreachable!(),
            }
            self.emitter.tick(PHASE_UPDATING, Some(self.total));
            Ok(())
        }))
        .buffer_unordered(APPLY_FANOUT)
        .collect()
        .await;

        results.into_iter().collect()
    }

    /// Phase 4: materialize blobs and refresh the index, best effort.
    async fn create_phase(&self, plan: &[Op]) -> anyhow::Result<()> {
        let creations: Vec<&Op> = plan
            .iter()
            .filter(|op| {
                matches!(
                    op,
                    Op::Create { .. }
                        | Op::CreateIndex { .. }
                        | Op::Update { .. }
                        | Op::UpdateDirToBlob { .. }
                )
            })
            .collect();
        if creations.is_empty() {
            return Ok(());
        }

        let index_arc = self.repository.index();
        let mut index = index_arc.lock().await;
        index.rehydrate()?;

        let staged: Vec<Option<StagedEntry>> =
            stream::iter(creations.into_iter().map(|op| self.materialize(op)))
                .buffer_unordered(APPLY_FANOUT)
                .collect()
                .await;

        for (path, oid, mode, mut stat) in staged.into_iter().flatten() {
            // the declared mode wins over filesystem reporting; executable
            // bits are untrustworthy on case-insensitive platforms
            stat.mode = mode;
            index.add(IndexEntry::new(path, oid, stat));
        }

        index.write_updates()
    }

    async fn materialize(&self, op: &Op) -> Option<StagedEntry> {
        let result = self.try_materialize(op).await;
        self.emitter.tick(PHASE_UPDATING, Some(self.total));

        match result {
            Ok(staged) => staged,
            Err(error) => {
                tracing::warn!(?op, %error, "skipping failed workdir write");
                None
            }
        }
    }

    async fn try_materialize(&self, op: &Op) -> anyhow::Result<Option<StagedEntry>> {
        let workspace = self.repository.workspace();

        match op {
            // the content is already on disk; only the index needs it
            Op::CreateIndex { path, oid, mode } => {
                let stat = workspace.stat_file(path).await?;
                Ok(Some((path.clone(), oid.clone(), *mode, stat)))
            }
            Op::Create { path, oid, mode } => self.write_blob(path, oid, *mode, false).await,
            Op::Update {
                path,
                oid,
                mode,
                chmod,
            } => self.write_blob(path, oid, *mode, *chmod).await,
            Op::UpdateDirToBlob { path, oid } => {
                // phases 1 and 2 cleared the tracked children and an
                // already-missing directory is fine; anything left behind
                // is untracked and must not be destroyed
                workspace.remove_dir_if_exists(path).await?;
                self.write_blob(path, oid, EntryMode::File(FileMode::Regular), false)
                    .await
            }
            _ => Ok(None),
        }
    }

    async fn write_blob(
        &self,
        path: &Path,
        oid: &ObjectId,
        mode: EntryMode,
        chmod: bool,
    ) -> anyhow::Result<Option<StagedEntry>> {
        let workspace = self.repository.workspace();
        let blob = self
            .repository
            .database()
            .parse_object_as_blob(oid)?
            .with_context(|| format!("object {oid} is not a blob"))?;

        // file modes are set only on create
        if chmod {
            workspace.remove_file_if_exists(path).await?;
        }

        match mode {
            EntryMode::File(FileMode::Regular) => workspace.write_file(path, blob.content()).await?,
            EntryMode::File(FileMode::Executable) => {
                workspace.write_executable(path, blob.content()).await?
            }
            EntryMode::Symlink => workspace.write_symlink(path, blob.content()).await?,
            other => anyhow::bail!("invalid blob mode {other} at {}", path.display()),
        }

        let stat = workspace.stat_file(path).await?;
        Ok(Some((path.to_path_buf(), oid.clone(), mode, stat)))
    }
}
