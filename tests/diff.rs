//! Integration tests for change analysis.

mod common;

use std::fs;

use common::{git_stdout, TestEnv};

use capsule::capture;
use capsule::changes;
use capsule::git::ChangeStatus;

#[test]
fn test_analyze_empty_session() {
    let env = TestEnv::new();
    let clone = env.provision("s1");

    let set = changes::analyze(&clone).unwrap();
    assert!(set.is_empty());
}

#[test]
fn test_analyze_classifies_changes() {
    let env = TestEnv::new();
    let clone = env.provision("s1");

    fs::write(clone.join("README.md"), "TEST CHANGED").unwrap();
    fs::write(clone.join("brand-new.txt"), "hello\n").unwrap();
    fs::remove_file(clone.join("notes.txt")).unwrap();

    let set = changes::analyze(&clone).unwrap();
    assert_eq!(set.modified.len(), 1);
    assert_eq!(set.modified[0].path, "README.md");
    assert_eq!(set.added.len(), 1);
    assert_eq!(set.added[0].path, "brand-new.txt");
    assert_eq!(set.deleted.len(), 1);
    assert_eq!(set.deleted[0].path, "notes.txt");
    assert!(set.renamed.is_empty());
}

#[test]
fn test_analyze_detects_pure_rename() {
    let env = TestEnv::new();
    let clone = env.provision("s1");

    fs::rename(clone.join("notes.txt"), clone.join("moved.txt")).unwrap();

    let set = changes::analyze(&clone).unwrap();
    assert_eq!(set.renamed.len(), 1);
    let rename = &set.renamed[0];
    assert_eq!(rename.status, ChangeStatus::Renamed);
    assert_eq!(rename.path, "moved.txt");
    assert_eq!(rename.old_path.as_deref(), Some("notes.txt"));
    assert_eq!(rename.similarity, Some(100));
    assert!(set.added.is_empty());
    assert!(set.deleted.is_empty());
}

#[test]
fn test_rewrite_beyond_threshold_is_add_plus_delete() {
    let env = TestEnv::new();
    let clone = env.provision("s1");

    // Same path shuffle, but the content shares nothing with notes.txt:
    // below the similarity threshold this is an independent pair.
    fs::remove_file(clone.join("notes.txt")).unwrap();
    let rewritten: String = (0..20)
        .map(|i| format!("entirely different content {}\n", i * 7))
        .collect();
    fs::write(clone.join("moved.txt"), rewritten).unwrap();

    let set = changes::analyze(&clone).unwrap();
    assert!(set.renamed.is_empty());
    assert_eq!(set.added.len(), 1);
    assert_eq!(set.added[0].path, "moved.txt");
    assert_eq!(set.deleted.len(), 1);
    assert_eq!(set.deleted[0].path, "notes.txt");
}

#[test]
fn test_analyze_is_repeatable() {
    let env = TestEnv::new();
    let clone = env.provision("s1");

    fs::write(clone.join("README.md"), "TEST CHANGED").unwrap();

    let first = changes::analyze(&clone).unwrap();
    let head_after_first = git_stdout(&clone, &["rev-parse", "HEAD"]);

    let second = changes::analyze(&clone).unwrap();
    let head_after_second = git_stdout(&clone, &["rev-parse", "HEAD"]);

    // Root-commit invariance: no intervening changes, no new snapshot.
    assert_eq!(head_after_first, head_after_second);
    assert_eq!(first.len(), second.len());
    assert_eq!(first.paths(), second.paths());
}

#[test]
fn test_snapshot_idempotent() {
    let env = TestEnv::new();
    let clone = env.provision("s1");

    fs::write(clone.join("extra.txt"), "x\n").unwrap();
    let first = capture::snapshot(&clone).unwrap();
    let second = capture::snapshot(&clone).unwrap();
    assert_eq!(first, second);

    // A created-then-deleted file is "never existed" relative to the root.
    fs::remove_file(clone.join("extra.txt")).unwrap();
    capture::snapshot(&clone).unwrap();
    let set = changes::analyze(&clone).unwrap();
    assert!(
        set.paths().iter().all(|p| *p != "extra.txt"),
        "created-then-deleted file leaked into the change set"
    );
}

#[test]
fn test_root_commit_is_stable() {
    let env = TestEnv::new();
    let clone = env.provision("s1");

    let root_before = capture::root_commit(&clone).unwrap();
    fs::write(clone.join("extra.txt"), "x\n").unwrap();
    capture::snapshot(&clone).unwrap();
    let root_after = capture::root_commit(&clone).unwrap();

    assert_eq!(root_before, root_after);
}
