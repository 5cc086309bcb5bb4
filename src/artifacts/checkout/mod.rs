//! Checkout
//!
//! Moves the working tree and index from one committed state to another
//! named reference, optionally restricted to a set of path prefixes and a
//! glob. The flow: ref name → object id → tri-walk → plan → (abort on
//! conflict) → four-phase apply → HEAD update.
//!
//! Both conflict detection and application work from a plan produced before
//! any side effect, so a conflicting checkout leaves the repository
//! untouched.

pub mod apply;
pub mod error;
pub mod pathspec;
pub mod plan;
pub mod planner;
pub mod progress;
pub mod walker;

use crate::areas::repository::Repository;
use crate::artifacts::checkout::apply::Applier;
use crate::artifacts::checkout::error::CheckoutError;
use crate::artifacts::checkout::pathspec::CheckoutFilter;
use crate::artifacts::checkout::plan::Op;
use crate::artifacts::checkout::progress::{Emitter, ProgressCallback};
use crate::artifacts::checkout::walker::TriWalker;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use std::path::PathBuf;

/// Options for [`Repository::checkout`].
pub struct CheckoutOptions {
    /// Branch or commit-ish to check out.
    pub target: String,
    /// Prefix filter; only paths under these participate.
    pub filepaths: Vec<PathBuf>,
    /// Optional glob, rooted at its literal prefix relative to each
    /// filepath.
    pub pattern: Option<String>,
    /// Remote consulted when `target` only resolves under
    /// `<remote>/<target>`.
    pub remote: String,
    /// Update `HEAD` only; leave the working tree and index alone.
    pub no_checkout: bool,
    /// Return the plan without applying it; no side effects at all.
    pub dry_run: bool,
    /// Prepended to emitted event names.
    pub emitter_prefix: String,
    /// Progress subscriber.
    pub on_progress: Option<ProgressCallback>,
}

impl CheckoutOptions {
    pub fn new(target: impl Into<String>) -> Self {
        CheckoutOptions {
            target: target.into(),
            filepaths: vec![PathBuf::from(".")],
            pattern: None,
            remote: "origin".to_string(),
            no_checkout: false,
            dry_run: false,
            emitter_prefix: String::new(),
            on_progress: None,
        }
    }
}

impl Repository {
    /// Check out `options.target`, returning the executed (or, under
    /// `dry_run`, the planned) op list.
    pub async fn checkout(&self, options: CheckoutOptions) -> anyhow::Result<Vec<Op>> {
        self.checkout_inner(options).await.context("checkout")
    }

    async fn checkout_inner(&self, options: CheckoutOptions) -> anyhow::Result<Vec<Op>> {
        if options.target.is_empty() {
            return Err(CheckoutError::MissingRequiredParameter("ref").into());
        }

        let oid = self.resolve_checkout_target(&options)?;

        let commit = match self.database().parse_object_as_commit(&oid) {
            Ok(Some(commit)) => commit,
            Ok(None) => anyhow::bail!("object {oid} is not a commit"),
            Err(_) => {
                return Err(CheckoutError::CommitNotFetched {
                    reference: options.target.clone(),
                    oid,
                }
                .into());
            }
        };

        if options.no_checkout {
            if self.refs().read_head()?.as_ref() != Some(&oid) {
                self.refs().set_head(&options.target, &oid)?;
            }
            return Ok(Vec::new());
        }

        let tree = self
            .database()
            .parse_object_as_tree(commit.tree_oid())?
            .with_context(|| format!("object {} is not a tree", commit.tree_oid()))?;
        let filter = CheckoutFilter::new(&options.filepaths, options.pattern.as_deref())?;

        let plan = {
            let index_arc = self.index();
            let mut index = index_arc.lock().await;
            index.rehydrate()?;

            let analyzing = Emitter::new(&options.emitter_prefix, options.on_progress.clone());
            let walker = TriWalker::new(self, &filter, &analyzing);
            walker.walk(Some(&tree), &index)?
        };

        // both gates run before any mutation, and both batch: the caller
        // sees every offending path, not just the first
        let conflicts = plan::conflict_paths(&plan);
        if !conflicts.is_empty() {
            return Err(CheckoutError::Conflicts { paths: conflicts }.into());
        }

        let errors = plan::error_messages(&plan);
        if !errors.is_empty() {
            return Err(CheckoutError::Internal { messages: errors }.into());
        }

        if options.dry_run {
            return Ok(plan);
        }

        let updating = Emitter::new(&options.emitter_prefix, options.on_progress.clone());
        Applier::new(self, updating, plan.len())
            .apply(&plan)
            .await?;

        self.refs().set_head(&options.target, &oid)?;

        Ok(plan)
    }

    fn resolve_checkout_target(&self, options: &CheckoutOptions) -> anyhow::Result<ObjectId> {
        if let Some(oid) = self.refs().resolve_ref(&options.target)? {
            return Ok(oid);
        }

        // a raw object id detaches HEAD directly
        if let Ok(oid) = ObjectId::try_parse(options.target.clone()) {
            return Ok(oid);
        }

        // remote-tracking bootstrap: resolve <remote>/<ref>, record the
        // upstream, and create the local branch before proceeding
        let remote_ref = format!("{}/{}", options.remote, options.target);
        let Some(oid) = self.refs().resolve_ref(&remote_ref)? else {
            anyhow::bail!("reference {} not found", options.target);
        };

        self.config().set(
            &format!("branch.{}.remote", options.target),
            &options.remote,
        )?;
        self.config().set(
            &format!("branch.{}.merge", options.target),
            &format!("refs/heads/{}", options.target),
        )?;
        self.refs().create_branch_ref(&options.target, &oid)?;

        Ok(oid)
    }
}
