//! Snapshotting of an isolated clone's working tree.
//!
//! This is the only writer of commits into an isolated repository after its
//! root commit. Both `diff` and `patch` call it before reading state.

use anyhow::{bail, Result};
use log::debug;
use std::path::Path;

use crate::git;

/// Commit the complete current working-tree state, including deletions.
/// Idempotent: when nothing changed since HEAD, no commit is created and the
/// existing HEAD id is returned.
pub fn snapshot(clone: &Path) -> Result<String> {
    git::add_all(clone)?;

    if git::staged_differs_from_head(clone)? {
        git::commit(clone, "Snapshot working tree")?;
        debug!("Captured new snapshot in {}", clone.display());
    } else {
        debug!("Working tree unchanged, no snapshot needed");
    }

    git::head_commit(clone)
}

/// The single fixed commit all diffs for a session are measured against.
pub fn root_commit(clone: &Path) -> Result<String> {
    let roots = git::root_commits(clone)?;
    match roots.as_slice() {
        [root] => Ok(root.clone()),
        [] => bail!("Isolated clone has no commits: {}", clone.display()),
        _ => bail!(
            "Isolated clone has {} root commits, expected exactly one: {}",
            roots.len(),
            clone.display()
        ),
    }
}
