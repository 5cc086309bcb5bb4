//! References
//!
//! Human-readable names pointing at commits. A ref file contains either a
//! 40-hex object id (direct) or `ref: <path>` (symbolic). `HEAD` is the
//! distinguished symbolic ref naming the checked-out branch, or a detached
//! object id.

use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use derive_new::new;
use file_guard::Lock;
use std::io::Write;
use std::ops::DerefMut;
use std::path::{Path, PathBuf};

/// Pattern for symbolic reference contents
const SYMREF_REGEX: &str = r"^ref: (.+)$";

pub const HEAD_REF_NAME: &str = "HEAD";

#[derive(Debug, Clone)]
enum SymRefOrOid {
    SymRef(String),
    Oid(ObjectId),
}

impl SymRefOrOid {
    fn read_from(path: &Path) -> anyhow::Result<Option<SymRefOrOid>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let content = content.trim();

        if content.is_empty() {
            return Ok(None);
        }

        let symref_match = regex::Regex::new(SYMREF_REGEX)?.captures(content);
        if let Some(symref_match) = symref_match {
            Ok(Some(SymRefOrOid::SymRef(symref_match[1].to_string())))
        } else {
            Ok(Some(SymRefOrOid::Oid(ObjectId::try_parse(
                content.to_string(),
            )?)))
        }
    }
}

/// Reference manager rooted at the gitdir.
#[derive(Debug, new)]
pub struct Refs {
    path: Box<Path>,
}

impl Refs {
    /// Expand a short name to the full ref name, searching the gitdir
    /// itself, `refs/`, `refs/heads/`, and `refs/remotes/` in that order.
    pub fn expand_ref(&self, name: &str) -> anyhow::Result<Option<String>> {
        let candidates = [
            PathBuf::from(name),
            Path::new("refs").join(name),
            Path::new("refs").join("heads").join(name),
            Path::new("refs").join("remotes").join(name),
        ];

        Ok(candidates
            .into_iter()
            .find(|candidate| self.path.join(candidate).is_file())
            .map(|candidate| candidate.to_string_lossy().replace('\\', "/")))
    }

    /// Resolve a short name to an object id, following symbolic refs.
    pub fn resolve_ref(&self, name: &str) -> anyhow::Result<Option<ObjectId>> {
        match self.expand_ref(name)? {
            Some(full_ref) => self.read_symref(&self.path.join(full_ref)),
            None => Ok(None),
        }
    }

    pub fn read_head(&self) -> anyhow::Result<Option<ObjectId>> {
        self.read_symref(&self.head_path())
    }

    fn read_symref(&self, path: &Path) -> anyhow::Result<Option<ObjectId>> {
        match SymRefOrOid::read_from(path)? {
            Some(SymRefOrOid::SymRef(target)) => self.read_symref(&self.path.join(target)),
            Some(SymRefOrOid::Oid(oid)) => Ok(Some(oid)),
            None => Ok(None),
        }
    }

    /// Point `HEAD` at the checkout target: symbolically for branch refs,
    /// detached otherwise.
    pub fn set_head(&self, target: &str, oid: &ObjectId) -> anyhow::Result<()> {
        let full_ref = self.expand_ref(target)?;

        match full_ref {
            Some(full_ref) if full_ref.starts_with("refs/heads/") => {
                self.write_ref_file(&self.head_path(), format!("ref: {}\n", full_ref))
            }
            _ => self.write_ref_file(&self.head_path(), format!("{}\n", oid)),
        }
    }

    /// Create or overwrite `refs/heads/<name>` with a direct oid.
    pub fn create_branch_ref(&self, name: &str, oid: &ObjectId) -> anyhow::Result<()> {
        let branch_path = self.heads_path().join(name);
        self.write_ref_file(&branch_path, format!("{}\n", oid))
    }

    /// Write a ref file under an exclusive lock, creating parents as needed.
    pub fn write_ref_file(&self, path: &Path, raw_ref: String) -> anyhow::Result<()> {
        std::fs::create_dir_all(path.parent().with_context(|| {
            format!("unable to create parent directories for ref file {:?}", path)
        })?)?;

        let mut ref_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("unable to open ref file {:?}", path))?;
        let mut lock = file_guard::lock(&mut ref_file, Lock::Exclusive, 0, 1)?;
        lock.deref_mut().write_all(raw_ref.as_bytes())?;

        Ok(())
    }

    pub fn head_path(&self) -> PathBuf {
        self.path.join(HEAD_REF_NAME)
    }

    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs")
    }

    pub fn heads_path(&self) -> PathBuf {
        self.refs_path().join("heads")
    }

    pub fn remotes_path(&self) -> PathBuf {
        self.refs_path().join("remotes")
    }
}
