//! Shared fixtures: repositories built through the library's own
//! collaborator APIs (object store, refs), so each test starts from a real
//! committed state.

#![allow(dead_code)]

use assert_fs::TempDir;
use bytes::Bytes;
use fake::Fake;
use fake::faker::lorem::en::Words;
use rove::Repository;
use rove::artifacts::index::entry_mode::{EntryMode, FileMode};
use rove::artifacts::objects::blob::Blob;
use rove::artifacts::objects::commit::{Author, Commit};
use rove::artifacts::objects::object::Object;
use rove::artifacts::objects::object_id::ObjectId;
use rove::artifacts::objects::tree::{Tree, TreeEntry};

/// A node in a tree under construction.
pub enum Node {
    Blob { content: String, mode: EntryMode },
    Dir(Vec<(String, Node)>),
}

pub fn file(content: &str) -> Node {
    Node::Blob {
        content: content.to_string(),
        mode: EntryMode::File(FileMode::Regular),
    }
}

pub fn executable(content: &str) -> Node {
    Node::Blob {
        content: content.to_string(),
        mode: EntryMode::File(FileMode::Executable),
    }
}

pub fn symlink(target: &str) -> Node {
    Node::Blob {
        content: target.to_string(),
        mode: EntryMode::Symlink,
    }
}

pub fn dir(entries: Vec<(&str, Node)>) -> Node {
    Node::Dir(
        entries
            .into_iter()
            .map(|(name, node)| (name.to_string(), node))
            .collect(),
    )
}

pub fn init_repository() -> (TempDir, Repository) {
    let temp = TempDir::new().expect("failed to create temp dir");
    let repository =
        Repository::new(temp.path().to_path_buf()).expect("failed to open repository");
    repository.init().expect("failed to init repository");

    (temp, repository)
}

pub fn blob_oid(content: &str) -> ObjectId {
    Blob::new(Bytes::from(content.to_string()))
        .object_id()
        .expect("failed to hash blob")
}

pub fn store_blob(repository: &Repository, content: &str) -> ObjectId {
    repository
        .database()
        .store(&Blob::new(Bytes::from(content.to_string())))
        .expect("failed to store blob")
}

fn store_node(repository: &Repository, node: &Node) -> (ObjectId, EntryMode) {
    match node {
        Node::Blob { content, mode } => (store_blob(repository, content), *mode),
        Node::Dir(entries) => {
            let mut tree = Tree::default();
            for (name, child) in entries {
                let (oid, mode) = store_node(repository, child);
                tree.insert(name.clone(), TreeEntry::new(oid, mode));
            }

            let oid = repository
                .database()
                .store(&tree)
                .expect("failed to store tree");
            (oid, EntryMode::Directory)
        }
    }
}

/// Store a root tree plus a commit pointing at it; returns the commit oid.
pub fn commit_tree(repository: &Repository, entries: Vec<(&str, Node)>) -> ObjectId {
    let (tree_oid, _) = store_node(repository, &dir(entries));

    let author = Author::new("Test Author".to_string(), "author@example.com".to_string());
    let message = Words(3..6).fake::<Vec<String>>().join(" ");
    let commit = Commit::new(vec![], tree_oid, author, message);

    repository
        .database()
        .store(&commit)
        .expect("failed to store commit")
}

/// Commit a tree and point `refs/heads/<branch>` at it.
pub fn commit_branch(
    repository: &Repository,
    branch: &str,
    entries: Vec<(&str, Node)>,
) -> ObjectId {
    let oid = commit_tree(repository, entries);
    repository
        .refs()
        .create_branch_ref(branch, &oid)
        .expect("failed to create branch ref");

    oid
}

pub fn head_contents(repository: &Repository) -> String {
    std::fs::read_to_string(repository.gitdir().join("HEAD")).expect("failed to read HEAD")
}
