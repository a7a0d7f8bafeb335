//! Whole-tree mirror of a session clone over a target working tree, used
//! when precise patching fails.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

/// Mirror `src`'s working tree over `dest`: afterwards `dest` holds exactly
/// `src`'s files, with permissions and symlinks preserved. Entries absent
/// from `src` are removed. Version-control metadata on both sides is left
/// untouched.
pub fn mirror_tree(src: &Path, dest: &Path) -> Result<()> {
    // Clear the destination first so entries deleted in `src` disappear.
    for entry in
        fs::read_dir(dest).with_context(|| format!("Failed to read {}", dest.display()))?
    {
        let entry = entry?;
        if entry.file_name() == ".git" {
            continue;
        }
        let path = entry.path();
        let removed = if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.with_context(|| format!("Failed to remove {}", path.display()))?;
    }

    for entry in
        fs::read_dir(src).with_context(|| format!("Failed to read {}", src.display()))?
    {
        let entry = entry?;
        if entry.file_name() == ".git" {
            continue;
        }
        copy_entry(&entry.path(), &dest.join(entry.file_name()))?;
    }

    Ok(())
}

fn copy_entry(src: &Path, dest: &Path) -> Result<()> {
    let file_type = src
        .symlink_metadata()
        .with_context(|| format!("Failed to stat {}", src.display()))?
        .file_type();

    if file_type.is_symlink() {
        // Recreate the link itself, even when its target is dangling.
        let target = fs::read_link(src)?;
        symlink(&target, dest)
            .with_context(|| format!("Failed to create symlink {}", dest.display()))?;
    } else if file_type.is_dir() {
        fs::create_dir_all(dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_entry(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else {
        reflink_copy::reflink_or_copy(src, dest)
            .with_context(|| format!("Failed to copy {}", src.display()))?;
    }

    Ok(())
}
