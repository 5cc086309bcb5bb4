//! Plan-level behavior: determinism, ordering guarantees, path filtering.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use rove::{CheckoutOptions, Op};
use std::path::{Path, PathBuf};

fn dry_run(target: &str) -> CheckoutOptions {
    CheckoutOptions {
        dry_run: true,
        ..CheckoutOptions::new(target)
    }
}

/// The two binding order invariants: a directory is created before
/// anything inside it, and everything inside a directory is deleted before
/// the directory itself.
fn assert_apply_order(plan: &[Op]) {
    for (index, op) in plan.iter().enumerate() {
        match op {
            Op::Create { path, .. } => {
                for (mkdir_index, other) in plan.iter().enumerate() {
                    if let Op::Mkdir { path: dir } = other
                        && path.starts_with(dir)
                        && path != dir
                    {
                        assert!(
                            mkdir_index < index,
                            "mkdir of {} must precede create of {}",
                            dir.display(),
                            path.display()
                        );
                    }
                }
            }
            Op::Rmdir { path: dir } => {
                for (delete_index, other) in plan.iter().enumerate() {
                    if let Op::Delete { path } = other
                        && path.starts_with(dir)
                    {
                        assert!(
                            delete_index < index,
                            "delete of {} must precede rmdir of {}",
                            path.display(),
                            dir.display()
                        );
                    }
                }
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn fresh_checkout_plans_creates_and_mkdirs() {
    let (_temp, repository) = init_repository();
    commit_branch(
        &repository,
        "master",
        vec![
            ("a", file("hello\n")),
            ("d", dir(vec![("b", executable("x"))])),
        ],
    );

    let plan = repository.checkout(dry_run("master")).await.unwrap();

    let mut paths: Vec<&Path> = plan.iter().filter_map(|op| op.path()).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![Path::new("a"), Path::new("d"), Path::new("d/b")]
    );

    assert!(plan.iter().any(|op| matches!(
        op,
        Op::Mkdir { path } if path == Path::new("d")
    )));
    assert!(plan.iter().any(|op| matches!(
        op,
        Op::Create { path, oid, .. } if path == Path::new("a") && *oid == blob_oid("hello\n")
    )));
    assert!(plan.iter().any(|op| matches!(
        op,
        Op::Create { path, oid, .. } if path == Path::new("d/b") && *oid == blob_oid("x")
    )));

    assert_apply_order(&plan);
}

#[tokio::test]
async fn plans_are_deterministic_across_runs() {
    let (_temp, repository) = init_repository();
    commit_branch(
        &repository,
        "master",
        vec![
            ("zeta.txt", file("z")),
            ("alpha.txt", file("a")),
            ("nested", dir(vec![("inner.txt", file("i"))])),
        ],
    );

    let first = repository.checkout(dry_run("master")).await.unwrap();
    let second = repository.checkout(dry_run("master")).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn checking_out_the_current_state_plans_nothing() {
    let (_temp, repository) = init_repository();
    commit_branch(
        &repository,
        "master",
        vec![("a.txt", file("same")), ("d", dir(vec![("b", file("x"))]))],
    );

    repository
        .checkout(CheckoutOptions::new("master"))
        .await
        .unwrap();

    let plan = repository
        .checkout(CheckoutOptions::new("master"))
        .await
        .unwrap();

    assert_eq!(plan, Vec::<Op>::new());
    assert_eq!(head_contents(&repository), "ref: refs/heads/master\n");
}

#[tokio::test]
async fn pattern_selects_matching_leaves_only() {
    let (temp, repository) = init_repository();
    commit_branch(
        &repository,
        "master",
        vec![
            ("a.json", file("{}")),
            ("a.md", file("# title")),
            ("a.txt", file("plain")),
        ],
    );

    let plan = repository
        .checkout(CheckoutOptions {
            pattern: Some("**/*.{json,md}".to_string()),
            ..CheckoutOptions::new("master")
        })
        .await
        .unwrap();

    let mut planned: Vec<&Path> = plan.iter().filter_map(|op| op.path()).collect();
    planned.sort();
    assert_eq!(planned, vec![Path::new("a.json"), Path::new("a.md")]);

    assert!(temp.path().join("a.json").exists());
    assert!(temp.path().join("a.md").exists());
    assert!(!temp.path().join("a.txt").exists());
}

#[tokio::test]
async fn pattern_root_prunes_unrelated_subtrees() {
    let (temp, repository) = init_repository();
    commit_branch(
        &repository,
        "master",
        vec![
            ("src", dir(vec![("app.js", file("js")), ("app.ts", file("ts"))])),
            ("docs", dir(vec![("app.js", file("docs js"))])),
        ],
    );

    let plan = repository
        .checkout(CheckoutOptions {
            pattern: Some("src/**/*.js".to_string()),
            ..CheckoutOptions::new("master")
        })
        .await
        .unwrap();

    let planned: Vec<&Path> = plan.iter().filter_map(|op| op.path()).collect();
    assert_eq!(planned, vec![Path::new("src/app.js")]);

    assert!(temp.path().join("src/app.js").exists());
    assert!(!temp.path().join("src/app.ts").exists());
    assert!(!temp.path().join("docs").exists());
}

#[tokio::test]
async fn filepaths_restrict_the_walk_to_their_prefixes() {
    let (temp, repository) = init_repository();
    commit_branch(
        &repository,
        "master",
        vec![
            ("kept", dir(vec![("in.txt", file("in"))])),
            ("skipped", dir(vec![("out.txt", file("out"))])),
        ],
    );

    let plan = repository
        .checkout(CheckoutOptions {
            filepaths: vec![PathBuf::from("kept")],
            ..CheckoutOptions::new("master")
        })
        .await
        .unwrap();

    assert!(plan.iter().all(|op| {
        op.path()
            .is_none_or(|path| path.starts_with("kept"))
    }));
    assert!(temp.path().join("kept/in.txt").exists());
    assert!(!temp.path().join("skipped").exists());
}

#[tokio::test]
async fn deletions_come_before_their_containing_rmdir() {
    let (_temp, repository) = init_repository();
    commit_branch(
        &repository,
        "master",
        vec![(
            "d",
            dir(vec![("e", dir(vec![("f.txt", file("deep"))]))]),
        )],
    );
    repository
        .checkout(CheckoutOptions::new("master"))
        .await
        .unwrap();

    commit_branch(&repository, "emptied", vec![("root.txt", file("root"))]);
    let plan = repository.checkout(dry_run("emptied")).await.unwrap();

    assert!(plan.iter().any(|op| matches!(
        op,
        Op::Delete { path } if path == Path::new("d/e/f.txt")
    )));
    assert!(plan.iter().any(|op| matches!(
        op,
        Op::Rmdir { path } if path == Path::new("d")
    )));
    assert!(plan.iter().any(|op| matches!(
        op,
        Op::Rmdir { path } if path == Path::new("d/e")
    )));

    let rmdir_outer = plan
        .iter()
        .position(|op| matches!(op, Op::Rmdir { path } if path == Path::new("d")))
        .unwrap();
    let rmdir_inner = plan
        .iter()
        .position(|op| matches!(op, Op::Rmdir { path } if path == Path::new("d/e")))
        .unwrap();
    assert!(rmdir_inner < rmdir_outer, "inner rmdir must come first");

    assert_apply_order(&plan);
}
