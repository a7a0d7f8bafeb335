//! Synchronization of a session's state back into the source repository.
//!
//! The engine makes the target branch's working tree exactly equal to the
//! isolated clone's current state, as a staged-but-uncommitted change set,
//! and keeps the source repository recoverable if any step fails. A precise
//! patch path preserves rename provenance; a bulk mirror guarantees
//! convergence when 3-way application cannot.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::debug;
use std::path::{Path, PathBuf};

use crate::capture;
use crate::config::Config;
use crate::git;
use crate::mirror;

/// Terminal state of a successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The patch series applied cleanly; changes are staged on the target
    /// branch.
    Applied,
    /// 3-way application failed and the tree was mirrored instead. Content
    /// is byte-identical but rename provenance was lost.
    FellBack,
    /// The target already matched the session state.
    NoChanges,
}

/// Run the sync state machine for one session.
pub fn sync(cfg: &Config, name: &str) -> Result<SyncOutcome> {
    let clone = cfg.clone_path(name);
    if !clone.exists() {
        bail!(
            "No clone for session '{}' at {} (run `capsule run {}` first)",
            name,
            clone.display(),
            name
        );
    }
    let repo = cfg.repo_path.as_path();

    let head = capture::snapshot(&clone)?;
    let root = capture::root_commit(&clone)?;
    debug!("Syncing {} (root {}, head {})", name, root, head);

    let base = choose_base(repo)?;
    ensure_branch(repo, name, base.as_deref())?;

    // Tree ids are content-derived, so the clone's snapshot tree and the
    // target's staged tree compare across repositories. Equal trees mean
    // there is nothing to do, including on a patch run repeated with no
    // intervening changes.
    let clone_tree = git::tree_id(&clone, &head)?;
    match git::write_tree(repo) {
        Ok(staged_tree) if staged_tree == clone_tree => {
            eprintln!("No changes to sync");
            return Ok(SyncOutcome::NoChanges);
        }
        Ok(_) => {}
        Err(e) => debug!("Could not compute staged tree, continuing: {:#}", e),
    }

    let backup = create_backup(repo, name);

    match reset_clean_apply(repo, &clone, &root, &head, base.as_deref()) {
        Ok(outcome) => {
            if let Some(backup) = backup {
                if let Err(e) = git::delete_branch(repo, &backup) {
                    eprintln!(
                        "Warning: could not delete backup branch '{}': {:#}",
                        backup, e
                    );
                }
            }
            Ok(outcome)
        }
        Err(e) => {
            rollback(repo, name, backup.as_deref());
            Err(e)
        }
    }
}

/// Base ref preference: `origin/main` if reachable, else local `main`, else
/// the branch's own tip (`None`). The order favors the most up-to-date
/// shared base.
fn choose_base(repo: &Path) -> Result<Option<String>> {
    if git::ref_exists(repo, "refs/remotes/origin/main")? {
        return Ok(Some("origin/main".to_string()));
    }
    if git::branch_exists(repo, "main")? {
        return Ok(Some("main".to_string()));
    }
    Ok(None)
}

fn ensure_branch(repo: &Path, name: &str, base: Option<&str>) -> Result<()> {
    if !git::branch_exists(repo, name)? {
        git::create_branch(repo, name, base.unwrap_or("HEAD"))
            .with_context(|| format!("Failed to create branch '{}'", name))?;
    }

    let current = git::current_branch(repo)?;
    if current != name {
        // Switching branches must never clobber operator work. The target
        // branch itself may carry staged changes from a previous run; those
        // are this tool's own output and get compared, not clobbered.
        if git::has_uncommitted_changes(repo)? {
            bail!(
                "Repository has uncommitted changes on branch '{}'; commit or stash them before syncing",
                current
            );
        }
        git::checkout(repo, name)
            .with_context(|| format!("Failed to check out branch '{}'", name))?;
    }
    Ok(())
}

/// Create the rollback anchor. Failure is tolerated but loudly flagged: the
/// sync proceeds without protection rather than aborting.
fn create_backup(repo: &Path, name: &str) -> Option<String> {
    let backup = backup_branch_name(name);
    match git::create_branch(repo, &backup, name) {
        Ok(()) => {
            debug!("Created backup branch {}", backup);
            Some(backup)
        }
        Err(e) => {
            eprintln!(
                "Warning: could not create backup branch, proceeding without rollback protection: {:#}",
                e
            );
            None
        }
    }
}

fn backup_branch_name(name: &str) -> String {
    format!("{}.backup.{}", name, Utc::now().format("%Y%m%d%H%M%S"))
}

/// Steps Reset through ApplyPatch. Any error propagated from here triggers
/// rollback in the caller.
fn reset_clean_apply(
    repo: &Path,
    clone: &Path,
    root: &str,
    head: &str,
    base: Option<&str>,
) -> Result<SyncOutcome> {
    if let Some(base) = base {
        git::reset_hard(repo, base)
            .with_context(|| format!("Failed to reset target branch to '{}'", base))?;
    }

    clean_worktree(repo).context("Failed to clean the target working tree")?;

    let patch_dir = tempfile::tempdir().context("Failed to create patch directory")?;
    let patches = git::format_patch(clone, root, head, patch_dir.path())
        .context("Failed to generate patch series")?;

    if patches.is_empty() {
        // No-op cases were handled before any destructive step; an empty
        // series here still has to converge on the clone's content.
        debug!("Patch series is empty after clean; mirroring instead");
        return fallback(clone, repo);
    }

    match apply_series(repo, &patches) {
        Ok(()) => {
            git::add_all(repo)?;
            Ok(SyncOutcome::Applied)
        }
        Err(e) => {
            eprintln!(
                "Warning: 3-way patch application failed ({:#}); falling back to bulk copy",
                e
            );
            // Back to the clean state at the branch tip, discarding the
            // failed patch.
            git::reset_hard(repo, "HEAD")?;
            clean_worktree(repo)?;
            fallback(clone, repo)
        }
    }
}

fn apply_series(repo: &Path, patches: &[PathBuf]) -> Result<()> {
    for patch in patches {
        git::apply_3way(repo, patch)
            .with_context(|| format!("Failed to apply {}", patch.display()))?;
    }
    Ok(())
}

fn fallback(clone: &Path, repo: &Path) -> Result<SyncOutcome> {
    mirror::mirror_tree(clone, repo).context("Bulk copy fallback failed")?;
    git::add_all(repo)?;
    eprintln!("Warning: changes were synced by bulk copy; rename provenance was lost");
    Ok(SyncOutcome::FellBack)
}

/// Remove everything except the version-control metadata from the target
/// working tree, so patch application starts from a known-empty tree.
fn clean_worktree(repo: &Path) -> Result<()> {
    for entry in std::fs::read_dir(repo)
        .with_context(|| format!("Failed to read {}", repo.display()))?
    {
        let entry = entry?;
        if entry.file_name() == ".git" {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        } else {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
    }
    Ok(())
}

/// Restore the target branch's content and tip from the backup anchor.
fn rollback(repo: &Path, name: &str, backup: Option<&str>) {
    match backup {
        Some(backup) => {
            eprintln!("Rolling back '{}' to backup branch '{}'", name, backup);
            let restored = git::checkout(repo, name)
                .and_then(|_| git::reset_hard(repo, backup))
                .and_then(|_| git::delete_branch(repo, backup));
            if let Err(e) = restored {
                eprintln!(
                    "Warning: rollback incomplete; backup branch '{}' retained: {:#}",
                    backup, e
                );
            }
        }
        None => {
            eprintln!("Warning: no backup branch exists; manual recovery may be required");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_branch_name_format() {
        let name = backup_branch_name("feature-1");
        assert!(name.starts_with("feature-1.backup."));
        let ts = name.rsplit('.').next().unwrap();
        assert_eq!(ts.len(), 14);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
    }
}
