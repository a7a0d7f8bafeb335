//! Integration tests for session provisioning.

mod common;

use std::fs;

use common::{git_stdout, TestEnv};

use capsule::provision::{self, UntrackedPolicy};

#[test]
fn test_provision_creates_detached_clone() {
    let env = TestEnv::new();
    let clone = env.provision("s1");

    assert!(clone.is_dir());
    assert_eq!(
        fs::read_to_string(clone.join("README.md")).unwrap(),
        "TEST"
    );

    // History is detached: a single root commit, disjoint from the source.
    let count = git_stdout(&clone, &["rev-list", "--count", "HEAD"]);
    assert_eq!(count, "1");
    let root = git_stdout(&clone, &["rev-list", "--max-parents=0", "HEAD"]);
    assert_ne!(root, env.repo.initial_commit);

    // The session branch exists in the source repository.
    let branches = git_stdout(&env.repo.dir, &["branch", "--list", "s1"]);
    assert!(branches.contains("s1"), "branch s1 missing: {}", branches);
}

#[test]
fn test_provision_tracks_same_files_as_source() {
    let env = TestEnv::new();
    env.repo
        .commit_file("src/deep/nested.txt", "nested\n", "Add nested file");
    let clone = env.provision("s1");

    let mut source: Vec<String> = git_stdout(&env.repo.dir, &["ls-tree", "-r", "--name-only", "main"])
        .lines()
        .map(String::from)
        .collect();
    let mut cloned: Vec<String> = git_stdout(&clone, &["ls-files"])
        .lines()
        .map(String::from)
        .collect();
    source.sort();
    cloned.sort();
    assert_eq!(source, cloned);
}

#[test]
fn test_provision_is_idempotent() {
    let env = TestEnv::new();
    let first = env.provision("s1");

    let branches_before = git_stdout(&env.repo.dir, &["branch", "--list"]);
    let head_before = git_stdout(&env.repo.dir, &["rev-parse", "HEAD"]);

    let second = env.provision("s1");
    assert_eq!(first, second);

    // The second run performed no git mutation on the source repository.
    assert_eq!(branches_before, git_stdout(&env.repo.dir, &["branch", "--list"]));
    assert_eq!(head_before, git_stdout(&env.repo.dir, &["rev-parse", "HEAD"]));
}

#[test]
fn test_provision_preserves_crlf_bytes() {
    let env = TestEnv::new();
    env.repo
        .commit_file("dos.txt", "first\r\nsecond\r\n", "Add CRLF file");

    let clone = env.provision("s1");
    let bytes = fs::read(clone.join("dos.txt")).unwrap();
    assert_eq!(bytes, b"first\r\nsecond\r\n");
}

#[test]
fn test_provision_fails_on_dirty_repo() {
    let env = TestEnv::new();
    fs::write(env.repo.dir.join("README.md"), "MODIFIED").unwrap();

    let result = provision::provision(&env.cfg, "s1", "main", UntrackedPolicy::Keep);
    assert!(result.is_err());
    assert!(!env.cfg.clone_path("s1").exists());
}

#[test]
fn test_provision_fails_on_missing_branch() {
    let env = TestEnv::new();
    let result = provision::provision(&env.cfg, "s1", "no-such-branch", UntrackedPolicy::Keep);
    assert!(result.is_err());
}

#[test]
fn test_untracked_clean_policy() {
    let env = TestEnv::new();
    fs::write(env.repo.dir.join("scratch.tmp"), "junk").unwrap();

    env.provision("s1"); // UntrackedPolicy::Keep
    assert!(env.repo.dir.join("scratch.tmp").exists());

    provision::provision(&env.cfg, "s2", "main", UntrackedPolicy::Clean).unwrap();
    assert!(!env.repo.dir.join("scratch.tmp").exists());
}
