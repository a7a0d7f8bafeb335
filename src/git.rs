use anyhow::{bail, Context, Result};
use log::warn;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use strum::Display;

/// Similarity threshold for rename and copy detection, in percent.
pub const RENAME_THRESHOLD: &str = "90%";

/// Classification of a single path-level difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
}

/// One entry of a tree-to-tree diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub status: ChangeStatus,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    /// Similarity score for renames and copies. Informational only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<u8>,
}

fn git(repo: &Path, args: &[&str]) -> Result<Output> {
    Command::new("git")
        .current_dir(repo)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run git {}", args.first().unwrap_or(&"")))
}

/// Run git and fail with its stderr if it exits non-zero.
fn git_ok(repo: &Path, args: &[&str]) -> Result<()> {
    let output = git(repo, args)?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

fn git_stdout(repo: &Path, args: &[&str]) -> Result<String> {
    let output = git(repo, args)?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Exit-code query: 0 maps to true, 1 to false, anything else is an error.
fn git_bool(repo: &Path, args: &[&str]) -> Result<bool> {
    let output = git(repo, args)?;
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ),
    }
}

pub fn current_branch(repo: &Path) -> Result<String> {
    git_stdout(repo, &["branch", "--show-current"])
}

pub fn branch_exists(repo: &Path, branch: &str) -> Result<bool> {
    let refname = format!("refs/heads/{}", branch);
    ref_exists(repo, &refname)
}

pub fn ref_exists(repo: &Path, refname: &str) -> Result<bool> {
    let output = git(repo, &["rev-parse", "--verify", "--quiet", refname])?;
    Ok(output.status.success())
}

pub fn rev_parse(repo: &Path, rev: &str) -> Result<String> {
    git_stdout(repo, &["rev-parse", rev])
}

pub fn head_commit(repo: &Path) -> Result<String> {
    rev_parse(repo, "HEAD")
}

/// Tree object id of a revision. Tree ids are content-derived, so they
/// compare across repositories.
pub fn tree_id(repo: &Path, rev: &str) -> Result<String> {
    rev_parse(repo, &format!("{}^{{tree}}", rev))
}

/// Tree object id of the current index.
pub fn write_tree(repo: &Path) -> Result<String> {
    git_stdout(repo, &["write-tree"])
}

/// True when the working tree or the index differs from HEAD.
pub fn has_uncommitted_changes(repo: &Path) -> Result<bool> {
    let unstaged = !git_bool(repo, &["diff", "--quiet"])?;
    let staged = !git_bool(repo, &["diff", "--cached", "--quiet"])?;
    Ok(unstaged || staged)
}

/// True when the staged tree differs from HEAD.
pub fn staged_differs_from_head(repo: &Path) -> Result<bool> {
    Ok(!git_bool(repo, &["diff", "--cached", "--quiet"])?)
}

/// Untracked paths, including ignored ones. These are what a `clean -fdx`
/// would remove.
pub fn untracked_files(repo: &Path) -> Result<Vec<String>> {
    let stdout = git_stdout(repo, &["ls-files", "--others"])?;
    Ok(stdout.lines().map(String::from).collect())
}

/// Recursively force-remove untracked and ignored files.
pub fn clean_untracked(repo: &Path) -> Result<()> {
    git_ok(repo, &["clean", "-fdx"])
}

pub fn create_branch(repo: &Path, branch: &str, start_point: &str) -> Result<()> {
    git_ok(repo, &["branch", branch, start_point])
}

pub fn delete_branch(repo: &Path, branch: &str) -> Result<()> {
    git_ok(repo, &["branch", "-D", branch])
}

pub fn checkout(repo: &Path, branch: &str) -> Result<()> {
    git_ok(repo, &["checkout", "--quiet", branch])
}

pub fn reset_hard(repo: &Path, rev: &str) -> Result<()> {
    git_ok(repo, &["reset", "--hard", "--quiet", rev])
}

/// Clone a single branch locally, with line-ending normalization disabled in
/// the resulting repository so content stays byte-identical.
pub fn clone_branch(source: &Path, branch: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let status = Command::new("git")
        .args([
            "clone",
            "--quiet",
            "--config",
            "core.autocrlf=false",
            "--branch",
            branch,
            &source.to_string_lossy(),
            &dest.to_string_lossy(),
        ])
        .stdout(Stdio::null())
        .status()
        .context("Failed to run git clone")?;

    if !status.success() {
        bail!("Git clone of branch '{}' failed", branch);
    }

    Ok(())
}

/// Initialize a fresh repository with normalization disabled and a local
/// committer identity, so snapshots never depend on global git config.
pub fn init_detached(repo: &Path) -> Result<()> {
    git_ok(repo, &["init", "--quiet"])?;
    config_set(repo, "core.autocrlf", "false")?;
    config_set(repo, "user.name", "capsule")?;
    config_set(repo, "user.email", "capsule@localhost")?;
    Ok(())
}

pub fn config_set(repo: &Path, key: &str, value: &str) -> Result<()> {
    git_ok(repo, &["config", key, value])
}

/// Stage one path, bypassing ignore rules.
pub fn add_path_force(repo: &Path, path: &str) -> Result<()> {
    git_ok(repo, &["add", "--force", "--", path])
}

/// Stage everything, respecting deletions.
pub fn add_all(repo: &Path) -> Result<()> {
    git_ok(repo, &["add", "-A"])
}

pub fn commit(repo: &Path, message: &str) -> Result<()> {
    git_ok(repo, &["commit", "--quiet", "-m", message])
}

/// Tracked paths of the current checkout.
pub fn ls_files(repo: &Path) -> Result<Vec<String>> {
    let stdout = git_stdout(repo, &["ls-files"])?;
    Ok(stdout.lines().map(String::from).collect())
}

/// Tracked paths of an arbitrary revision (works without a checkout).
pub fn ls_tree_paths(repo: &Path, rev: &str) -> Result<Vec<String>> {
    let stdout = git_stdout(repo, &["ls-tree", "-r", "--name-only", rev])?;
    Ok(stdout.lines().map(String::from).collect())
}

/// True when the trees of two revisions are identical.
pub fn diff_is_empty(repo: &Path, from: &str, to: &str) -> Result<bool> {
    git_bool(repo, &["diff", "--quiet", from, to])
}

/// Tree-to-tree diff with rename/copy detection at the fixed threshold and
/// complete-rewrite detection enabled.
pub fn diff_status(repo: &Path, from: &str, to: &str) -> Result<Vec<Change>> {
    let renames = format!("--find-renames={}", RENAME_THRESHOLD);
    let copies = format!("--find-copies={}", RENAME_THRESHOLD);
    let stdout = git_stdout(
        repo,
        &["diff", "--name-status", "-B", &renames, &copies, from, to],
    )?;
    Ok(parse_name_status(&stdout))
}

/// Parse `--name-status` output into typed records. Lines with no path are
/// discarded.
pub fn parse_name_status(output: &str) -> Vec<Change> {
    let mut changes = Vec::new();
    for line in output.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split('\t');
        let code = parts.next().unwrap_or("");
        let status = match code.chars().next() {
            Some('A') => ChangeStatus::Added,
            Some('D') => ChangeStatus::Deleted,
            Some('M') => ChangeStatus::Modified,
            Some('R') => ChangeStatus::Renamed,
            Some('C') => ChangeStatus::Copied,
            _ => {
                warn!("Skipping unrecognized diff status line: {}", line);
                continue;
            }
        };
        let similarity = code[1..].parse::<u8>().ok();

        match status {
            ChangeStatus::Renamed | ChangeStatus::Copied => {
                if let (Some(old), Some(new)) = (parts.next(), parts.next()) {
                    if new.trim().is_empty() {
                        continue;
                    }
                    changes.push(Change {
                        status,
                        path: new.to_string(),
                        old_path: Some(old.to_string()),
                        similarity,
                    });
                }
            }
            _ => {
                if let Some(path) = parts.next() {
                    if path.trim().is_empty() {
                        continue;
                    }
                    changes.push(Change {
                        status,
                        path: path.to_string(),
                        old_path: None,
                        similarity: None,
                    });
                }
            }
        }
    }
    changes
}

/// Export the commits `from..to` as a patch series with full binary content
/// and full object ids, so binary files round-trip exactly. Returns the patch
/// files in application order.
pub fn format_patch(repo: &Path, from: &str, to: &str, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let renames = format!("--find-renames={}", RENAME_THRESHOLD);
    let range = format!("{}..{}", from, to);
    let stdout = git_stdout(
        repo,
        &[
            "format-patch",
            "--binary",
            "--full-index",
            &renames,
            "-o",
            &out_dir.to_string_lossy(),
            &range,
        ],
    )?;
    Ok(stdout.lines().map(PathBuf::from).collect())
}

/// Apply one patch with a 3-way merge, staging results into both the working
/// tree and the index. Does not commit.
pub fn apply_3way(repo: &Path, patch: &Path) -> Result<()> {
    git_ok(
        repo,
        &[
            "apply",
            "--3way",
            "--whitespace=nowarn",
            &patch.to_string_lossy(),
        ],
    )
}

/// Commits with no parent, reachable from HEAD.
pub fn root_commits(repo: &Path) -> Result<Vec<String>> {
    let stdout = git_stdout(repo, &["rev-list", "--max-parents=0", "HEAD"])?;
    Ok(stdout.lines().map(String::from).collect())
}

/// Fetch all heads and tags from an explicit remote URL into
/// `refs/remotes/origin/*`. The only networked operation in the tool.
pub fn fetch_url(repo: &Path, url: &str) -> Result<()> {
    git_ok(
        repo,
        &[
            "fetch",
            "--tags",
            "--force",
            url,
            "+refs/heads/*:refs/remotes/origin/*",
        ],
    )
}
