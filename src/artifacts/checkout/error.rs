//! Checkout error taxonomy
//!
//! Conflicts and internal errors are batched: the caller sees every
//! offending path, not just the first. Conflicts are reported, never
//! resolved.

use crate::artifacts::objects::object_id::ObjectId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("missing required parameter: {0}")]
    MissingRequiredParameter(&'static str),

    #[error("commit {oid} for ref {reference} is not present in the object store")]
    CommitNotFetched { reference: String, oid: ObjectId },

    #[error(
        "your local changes to the following files would be overwritten by checkout:\n{}\nplease commit your changes or stash them before you switch branches",
        format_paths(paths)
    )]
    Conflicts { paths: Vec<PathBuf> },

    #[error("checkout failed internally:\n{}", messages.join("\n"))]
    Internal { messages: Vec<String> },
}

impl CheckoutError {
    /// Conflicting paths, when this is a conflict failure.
    pub fn conflict_paths(&self) -> Option<&[PathBuf]> {
        match self {
            CheckoutError::Conflicts { paths } => Some(paths),
            _ => None,
        }
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| format!("\t{}", path.display()))
        .collect::<Vec<_>>()
        .join("\n")
}
