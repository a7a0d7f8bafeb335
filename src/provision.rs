//! Creation of the isolated, history-detached working copy for a session.

use anyhow::{bail, Context, Result};
use log::debug;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::git;

/// What to do with untracked files found in the source working tree before
/// provisioning. The CLI prompts; tests and scripted callers pick a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UntrackedPolicy {
    Prompt,
    Clean,
    Keep,
}

/// Provision the isolated clone for a session: a working copy of
/// `source_branch` whose tracked file set is byte-identical to the branch's
/// tree, with its own single-root history.
///
/// If the clone path already exists the existing copy is reused verbatim and
/// no git mutation is performed on the source repository.
pub fn provision(
    cfg: &Config,
    name: &str,
    source_branch: &str,
    untracked: UntrackedPolicy,
) -> Result<PathBuf> {
    let clone_path = cfg.clone_path(name);
    if clone_path.exists() {
        eprintln!("Reusing existing clone at: {}", clone_path.display());
        return Ok(clone_path);
    }

    let repo = cfg.repo_path.as_path();

    if !git::branch_exists(repo, source_branch)? {
        bail!(
            "Source branch '{}' does not exist in {}",
            source_branch,
            repo.display()
        );
    }

    // Never risk losing operator work: one dirty working tree covers both the
    // checked-out branch and the source branch, since they share it.
    if git::has_uncommitted_changes(repo)? {
        bail!(
            "Repository at {} has uncommitted changes; commit or stash them first",
            repo.display()
        );
    }

    handle_untracked(repo, untracked)?;

    // Branch creation is idempotent: re-running against an existing session
    // branch is a no-op here.
    if !git::branch_exists(repo, name)? {
        git::create_branch(repo, name, source_branch)
            .with_context(|| format!("Failed to create branch '{}'", name))?;
    }

    eprintln!(
        "Creating isolated clone: {} -> {}",
        repo.display(),
        clone_path.display()
    );
    git::clone_branch(repo, source_branch, &clone_path)?;

    if let Err(e) = detach_history(repo, source_branch, &clone_path) {
        // Leave nothing partially created behind.
        if let Err(rm) = std::fs::remove_dir_all(&clone_path) {
            eprintln!(
                "Warning: could not remove partial clone {}: {}",
                clone_path.display(),
                rm
            );
        }
        return Err(e);
    }

    Ok(clone_path)
}

fn handle_untracked(repo: &Path, policy: UntrackedPolicy) -> Result<()> {
    let untracked = git::untracked_files(repo)?;
    if untracked.is_empty() {
        return Ok(());
    }

    let clean = match policy {
        UntrackedPolicy::Clean => true,
        UntrackedPolicy::Keep => false,
        UntrackedPolicy::Prompt => {
            eprintln!("The source working tree has untracked files:");
            for path in untracked.iter().take(10) {
                eprintln!("  {}", path);
            }
            if untracked.len() > 10 {
                eprintln!("  ... and {} more", untracked.len() - 10);
            }
            print!("Remove them before provisioning? [y/N] ");
            io::stdout().flush()?;

            let mut response = String::new();
            io::stdin().read_line(&mut response)?;
            response.trim().eq_ignore_ascii_case("y")
        }
    };

    if clean {
        git::clean_untracked(repo).context("Failed to clean untracked files")?;
    } else {
        eprintln!("Warning: proceeding with untracked files in the source working tree");
    }
    Ok(())
}

/// Discard the clone's inherited metadata and re-commit its content as a
/// single root commit that records the literal bytes on disk.
fn detach_history(repo: &Path, source_branch: &str, clone_path: &Path) -> Result<()> {
    let tracked = git::ls_files(clone_path)?;

    let git_dir = clone_path.join(".git");
    std::fs::remove_dir_all(&git_dir)
        .with_context(|| format!("Failed to remove {}", git_dir.display()))?;

    git::init_detached(clone_path)?;

    // A committed attributes file could re-normalize content during the add.
    // Override it with a blanket binary rule for the initial add, restore it
    // before the root commit so the operator's policy applies afterwards.
    let attr_path = clone_path.join(".gitattributes");
    let original_attrs = match std::fs::read_to_string(&attr_path) {
        Ok(content) => Some(content),
        Err(_) => None,
    };
    std::fs::write(&attr_path, "* binary\n")
        .with_context(|| format!("Failed to write {}", attr_path.display()))?;

    let mut missing = 0usize;
    for path in &tracked {
        let full = clone_path.join(path);
        // symlink_metadata also sees broken symlinks, which plain exists()
        // reports as absent.
        if full.symlink_metadata().is_err() {
            debug!("Tracked path missing on disk, skipping: {}", path);
            missing += 1;
            continue;
        }
        if let Err(e) = git::add_path_force(clone_path, path) {
            eprintln!("Warning: could not add '{}': {:#}", path, e);
        }
    }
    if missing > 0 {
        debug!("{} tracked paths were missing on disk", missing);
    }

    match original_attrs {
        Some(content) => {
            std::fs::write(&attr_path, content)
                .with_context(|| format!("Failed to restore {}", attr_path.display()))?;
            git::add_path_force(clone_path, ".gitattributes")?;
        }
        None => {
            std::fs::remove_file(&attr_path)
                .with_context(|| format!("Failed to remove {}", attr_path.display()))?;
        }
    }

    git::commit(clone_path, "Initial commit")?;

    // Parity is expected to be off when broken symlinks were skipped, so this
    // only warns.
    let committed = git::ls_files(clone_path)?.len();
    let source_count = git::ls_tree_paths(repo, source_branch)?.len();
    if committed != source_count {
        eprintln!(
            "Warning: clone tracks {} files but branch '{}' has {}",
            committed, source_branch, source_count
        );
    }

    Ok(())
}
