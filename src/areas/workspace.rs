//! Working directory
//!
//! The filesystem collaborator. The traversal side is synchronous (`lstat`,
//! directory listing, content reads for hashing); the mutation side used by
//! the applier goes through `tokio::fs` so plan ops can run with bounded
//! fan-out.

use crate::artifacts::index::index_entry::EntryMetadata;
use anyhow::Context;
use bytes::Bytes;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
    gitdir: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>, gitdir: Box<Path>) -> Self {
        Workspace { path, gitdir }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn full_path(&self, file_path: &Path) -> PathBuf {
        self.path.join(file_path)
    }

    /// `lstat` a path relative to the working-tree root. `None` when the
    /// path does not exist. The raw file type rides along so callers can
    /// tell special files (sockets, fifos) apart from blobs.
    pub fn lstat(
        &self,
        file_path: &Path,
    ) -> anyhow::Result<Option<(EntryMetadata, std::fs::FileType)>> {
        let full = self.full_path(file_path);

        match std::fs::symlink_metadata(&full) {
            Ok(metadata) => {
                let file_type = metadata.file_type();
                Ok(Some(((full.as_path(), &metadata).try_into()?, file_type)))
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error).with_context(|| format!("unable to lstat {:?}", file_path)),
        }
    }

    /// Names inside a directory, ascending, with the gitdir filtered out.
    pub fn list_dir_names(&self, dir_path: &Path) -> anyhow::Result<Vec<String>> {
        let full = if dir_path == Path::new(".") {
            self.path.to_path_buf()
        } else {
            self.full_path(dir_path)
        };

        let mut names = std::fs::read_dir(&full)
            .with_context(|| format!("unable to list directory {:?}", dir_path))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path() != *self.gitdir)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }

    /// The bytes a blob at this path would hash: file contents for regular
    /// files, the link target for symlinks.
    pub fn read_blob_bytes(&self, file_path: &Path) -> anyhow::Result<Bytes> {
        let full = self.full_path(file_path);
        let metadata = std::fs::symlink_metadata(&full)?;

        if metadata.file_type().is_symlink() {
            let target = std::fs::read_link(&full)?;
            Ok(Bytes::from(target.into_os_string().into_encoded_bytes()))
        } else {
            Ok(Bytes::from(std::fs::read(&full)?))
        }
    }

    /// `lstat` through tokio, for index entries built after materialization.
    pub async fn stat_file(&self, file_path: &Path) -> anyhow::Result<EntryMetadata> {
        let full = self.full_path(file_path);
        let metadata = tokio::fs::symlink_metadata(&full)
            .await
            .with_context(|| format!("unable to stat {:?}", file_path))?;

        (full.as_path(), &metadata).try_into()
    }

    pub async fn write_file(&self, file_path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
        let full = self.full_path(file_path);

        // materialization under a pattern filter may skip mkdir ops
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&full, bytes)
            .await
            .with_context(|| format!("unable to write {:?}", file_path))
    }

    pub async fn write_executable(&self, file_path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        self.write_file(file_path, bytes).await?;

        let full = self.full_path(file_path);
        tokio::fs::set_permissions(&full, std::fs::Permissions::from_mode(0o755))
            .await
            .with_context(|| format!("unable to set permissions on {:?}", file_path))
    }

    pub async fn write_symlink(&self, file_path: &Path, target: &[u8]) -> anyhow::Result<()> {
        use std::os::unix::ffi::OsStrExt;

        let full = self.full_path(file_path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // symlink creation fails on an existing path
        match tokio::fs::remove_file(&full).await {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }

        let target = std::ffi::OsStr::from_bytes(target);
        tokio::fs::symlink(target, &full)
            .await
            .with_context(|| format!("unable to write symlink {:?}", file_path))
    }

    pub async fn remove_file(&self, file_path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(self.full_path(file_path)).await
    }

    /// Remove a file, treating an already-missing path as success.
    pub async fn remove_file_if_exists(&self, file_path: &Path) -> anyhow::Result<()> {
        match self.remove_file(file_path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => {
                Err(error).with_context(|| format!("unable to remove {:?}", file_path))
            }
        }
    }

    /// Non-recursive directory removal; the caller decides how to treat a
    /// non-empty directory.
    pub async fn remove_dir(&self, dir_path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_dir(self.full_path(dir_path)).await
    }

    /// Non-recursive removal treating an already-missing directory as
    /// success. A directory with content still fails.
    pub async fn remove_dir_if_exists(&self, dir_path: &Path) -> anyhow::Result<()> {
        match self.remove_dir(dir_path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => {
                Err(error).with_context(|| format!("unable to remove directory {:?}", dir_path))
            }
        }
    }

    pub async fn make_dir(&self, dir_path: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(self.full_path(dir_path))
            .await
            .with_context(|| format!("unable to create directory {:?}", dir_path))
    }
}
