//! Shared test utilities and fixtures.
//!
//! This module provides reusable test infrastructure for integration tests.

// Not all test files use all helpers, but we want them available.
#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use indoc::indoc;
use rand::Rng;

use capsule::config::Config;
use capsule::provision::{self, UntrackedPolicy};

/// Multi-line file committed into every test repository; rename and
/// similarity tests need something with real content.
pub const NOTES: &str = indoc! {"
    line 01: alpha
    line 02: bravo
    line 03: charlie
    line 04: delta
    line 05: echo
    line 06: foxtrot
    line 07: golf
    line 08: hotel
    line 09: india
    line 10: juliett
    line 11: kilo
    line 12: lima
    line 13: mike
    line 14: november
    line 15: oscar
    line 16: papa
    line 17: quebec
    line 18: romeo
    line 19: sierra
    line 20: tango
"};

/// A test fixture that creates a temporary git repository in /tmp.
/// The repository is initialized on a "main" branch with a README.md and a
/// notes.txt, committed. Does NOT change the current directory, allowing
/// tests to run in parallel. On drop, the temp directory is cleaned up.
pub struct TestRepo {
    pub dir: PathBuf,
    pub initial_commit: String,
}

impl TestRepo {
    pub fn init() -> Self {
        // Random component ensures uniqueness even when parallel tests read the same timestamp
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let random: u64 = rand::thread_rng().gen();
        let dir = PathBuf::from(format!("/tmp/capsule-test-{}-{:016x}", timestamp, random));
        fs::create_dir_all(&dir).expect("Failed to create temp directory");

        run_git(&dir, &["init", "--initial-branch=main"]);

        // Configure git user for commits; disable normalization so byte
        // fidelity assertions are not at the mercy of global config.
        run_git(&dir, &["config", "user.email", "test@example.com"]);
        run_git(&dir, &["config", "user.name", "Test User"]);
        run_git(&dir, &["config", "core.autocrlf", "false"]);

        fs::write(dir.join("README.md"), "TEST").expect("Failed to write README.md");
        fs::write(dir.join("notes.txt"), NOTES).expect("Failed to write notes.txt");

        run_git(&dir, &["add", "README.md", "notes.txt"]);
        run_git(&dir, &["commit", "-m", "Initial commit"]);

        let output = run_git(&dir, &["rev-parse", "HEAD"]);
        let initial_commit = String::from_utf8_lossy(&output.stdout).trim().to_string();

        TestRepo {
            dir,
            initial_commit,
        }
    }

    /// Write a file and commit everything.
    pub fn commit_file(&self, path: &str, content: &str, message: &str) {
        let full = self.dir.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&full, content).expect("Failed to write file");
        run_git(&self.dir, &["add", "-A"]);
        run_git(&self.dir, &["commit", "-m", message]);
    }
}

impl Drop for TestRepo {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

pub fn run_git(dir: &PathBuf, args: &[&str]) -> Output {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("Failed to run git command");

    if !output.status.success() {
        panic!(
            "Git command failed: git {}\nstderr: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    output
}

pub fn git_stdout(dir: &PathBuf, args: &[&str]) -> String {
    let output = run_git(dir, args);
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A source repository plus a clone prefix directory and the matching
/// `Config`, i.e. everything a session needs short of a container.
pub struct TestEnv {
    pub repo: TestRepo,
    pub clones: PathBuf,
    pub cfg: Config,
}

impl TestEnv {
    pub fn new() -> Self {
        let repo = TestRepo::init();
        let clones = repo.dir.with_file_name(format!(
            "{}-clones",
            repo.dir.file_name().unwrap().to_string_lossy()
        ));
        fs::create_dir_all(&clones).expect("Failed to create clones directory");

        let cfg = Config::new(repo.dir.clone(), clones.clone(), None)
            .expect("Failed to build test config");

        TestEnv { repo, clones, cfg }
    }

    /// Provision a session without prompting.
    pub fn provision(&self, name: &str) -> PathBuf {
        provision::provision(&self.cfg, name, "main", UntrackedPolicy::Keep)
            .expect("Failed to provision session")
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.clones);
    }
}
