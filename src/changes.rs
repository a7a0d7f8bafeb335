//! Classification of a session's changes against its root commit.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

use crate::capture;
use crate::git::{self, Change, ChangeStatus};

/// Path-level differences between the root commit and the current snapshot,
/// partitioned for display. Order within each list follows the underlying
/// diff's emission order.
#[derive(Debug, Default, Serialize)]
pub struct ChangeSet {
    pub renamed: Vec<Change>,
    pub added: Vec<Change>,
    pub modified: Vec<Change>,
    pub deleted: Vec<Change>,
}

impl ChangeSet {
    /// Partition raw diff entries. Copies are presented as new files
    /// annotated with their origin, not as moves. A rename whose old path is
    /// simultaneously reported as a new file is downgraded to an independent
    /// add: literal path identity wins over content similarity.
    pub fn from_changes(changes: Vec<Change>) -> Self {
        let added_paths: HashSet<&str> = changes
            .iter()
            .filter(|c| c.status == ChangeStatus::Added)
            .map(|c| c.path.as_str())
            .collect();

        let mut set = ChangeSet::default();
        for change in &changes {
            match change.status {
                ChangeStatus::Renamed => {
                    let collides = change
                        .old_path
                        .as_deref()
                        .is_some_and(|old| added_paths.contains(old));
                    if collides {
                        set.added.push(Change {
                            status: ChangeStatus::Added,
                            path: change.path.clone(),
                            old_path: None,
                            similarity: None,
                        });
                    } else {
                        set.renamed.push(change.clone());
                    }
                }
                ChangeStatus::Added | ChangeStatus::Copied => set.added.push(change.clone()),
                ChangeStatus::Modified => set.modified.push(change.clone()),
                ChangeStatus::Deleted => set.deleted.push(change.clone()),
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.renamed.is_empty()
            && self.added.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.renamed.len() + self.added.len() + self.modified.len() + self.deleted.len()
    }

    /// All paths named by this change set, for cross-checks against a
    /// generated patch series.
    pub fn paths(&self) -> Vec<&str> {
        self.renamed
            .iter()
            .chain(&self.added)
            .chain(&self.modified)
            .chain(&self.deleted)
            .map(|c| c.path.as_str())
            .collect()
    }
}

/// Snapshot the clone and classify every path changed since the root commit.
/// Read-only beyond the snapshot itself, and safe to repeat.
pub fn analyze(clone: &Path) -> Result<ChangeSet> {
    let head = capture::snapshot(clone)?;
    let root = capture::root_commit(clone)?;
    let changes = git::diff_status(clone, &root, &head)?;
    Ok(ChangeSet::from_changes(changes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(status: ChangeStatus, path: &str, old_path: Option<&str>) -> Change {
        Change {
            status,
            path: path.to_string(),
            old_path: old_path.map(String::from),
            similarity: None,
        }
    }

    #[test]
    fn test_partition() {
        let set = ChangeSet::from_changes(vec![
            change(ChangeStatus::Added, "new.rs", None),
            change(ChangeStatus::Modified, "lib.rs", None),
            change(ChangeStatus::Deleted, "gone.rs", None),
            change(ChangeStatus::Renamed, "b.rs", Some("a.rs")),
            change(ChangeStatus::Copied, "copy.rs", Some("orig.rs")),
        ]);
        assert_eq!(set.renamed.len(), 1);
        assert_eq!(set.added.len(), 2); // the add and the copy
        assert_eq!(set.modified.len(), 1);
        assert_eq!(set.deleted.len(), 1);
        assert_eq!(set.len(), 5);
        assert!(!set.is_empty());
    }

    #[test]
    fn test_rename_add_collision_prefers_path_identity() {
        // a.rs was deleted and recreated while its old content moved to b.rs:
        // the rename is downgraded so a.rs is not both a source and a new file.
        let set = ChangeSet::from_changes(vec![
            change(ChangeStatus::Added, "a.rs", None),
            change(ChangeStatus::Renamed, "b.rs", Some("a.rs")),
        ]);
        assert!(set.renamed.is_empty());
        assert_eq!(set.added.len(), 2);
        assert!(set.added.iter().all(|c| c.old_path.is_none()));
    }

    #[test]
    fn test_empty() {
        assert!(ChangeSet::from_changes(Vec::new()).is_empty());
    }
}
