//! Repository facade
//!
//! Coordinates the collaborator areas: object database, index (staging
//! area), workspace, refs, and config. High-level operations such as
//! checkout are implemented on this type in `artifacts::checkout`.
//!
//! The index is wrapped in `Arc<tokio::sync::Mutex<_>>`: applier phases
//! mutate it from async tasks, and only one critical section may hold it.

use crate::areas::config::Config;
use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::refs::Refs;
use crate::areas::workspace::Workspace;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Repository metadata directory name
const GIT_DIR: &str = ".git";

/// Object database directory name
const DATABASE_DIR: &str = "objects";

/// Index file name
const INDEX_FILE: &str = "index";

/// Config file name
const CONFIG_FILE: &str = "config";

/// Branch a fresh repository points at
pub const DEFAULT_BRANCH: &str = "master";

pub struct Repository {
    /// Working-tree root
    path: Box<Path>,
    /// Repository metadata root
    gitdir: Box<Path>,
    index: Arc<Mutex<Index>>,
    database: Database,
    workspace: Workspace,
    refs: Refs,
    config: Config,
}

impl Repository {
    /// Open (or prepare to create) a repository with the default
    /// `<dir>/.git` metadata root.
    pub fn new(path: PathBuf) -> anyhow::Result<Self> {
        Self::with_gitdir(path, PathBuf::from(GIT_DIR))
    }

    /// Open with an explicit metadata root.
    pub fn with_gitdir(path: PathBuf, gitdir: PathBuf) -> anyhow::Result<Self> {
        if !path.exists() {
            std::fs::create_dir_all(&path)?;
        }
        let path = path.canonicalize()?;
        let gitdir = if gitdir.is_absolute() {
            gitdir
        } else {
            path.join(gitdir)
        };

        let index = Index::new(gitdir.join(INDEX_FILE).into_boxed_path());
        let database = Database::new(gitdir.join(DATABASE_DIR).into_boxed_path());
        let workspace = Workspace::new(
            path.clone().into_boxed_path(),
            gitdir.clone().into_boxed_path(),
        );
        let refs = Refs::new(gitdir.clone().into_boxed_path());
        let config = Config::new(gitdir.join(CONFIG_FILE).into_boxed_path());

        Ok(Repository {
            path: path.into_boxed_path(),
            gitdir: gitdir.into_boxed_path(),
            index: Arc::new(Mutex::new(index)),
            database,
            workspace,
            refs,
            config,
        })
    }

    /// Create the gitdir skeleton: objects directory, refs/heads, and a
    /// symbolic HEAD pointing at the default branch.
    pub fn init(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(self.database.objects_path())?;
        std::fs::create_dir_all(self.refs.heads_path())?;

        if !self.refs.head_path().exists() {
            self.refs.write_ref_file(
                &self.refs.head_path(),
                format!("ref: refs/heads/{}\n", DEFAULT_BRANCH),
            )?;
        }

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn gitdir(&self) -> &Path {
        &self.gitdir
    }

    pub fn index(&self) -> Arc<Mutex<Index>> {
        self.index.clone()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
