//! Change detection between the files on disk and the manifest.
//!
//! Pure and in-memory: no filesystem or store access. The steady-state
//! path is "walk, hash, diff, find nothing", so this is kept to one pass
//! over each side.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::error::SyncError;
use crate::manifest::Manifest;

/// A candidate file with its freshly computed content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    pub abs_path: PathBuf,
    pub hash: String,
}

/// Files found on disk in one run.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub files: BTreeMap<String, FileState>,
    /// Relative paths (files or directories) that could not be read this
    /// run. Manifest entries at or beneath them are left alone.
    pub unreadable: BTreeSet<String>,
    pub errors: Vec<SyncError>,
}

impl Snapshot {
    fn shadows(&self, path: &str) -> bool {
        self.unreadable.iter().any(|u| {
            path == u
                || path
                    .strip_prefix(u.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: String,
    pub abs_path: PathBuf,
    pub hash: String,
}

/// Disjoint added / modified / removed partition, each sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<Change>,
    pub modified: Vec<Change>,
    pub removed: Vec<String>,
    pub unchanged: usize,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// Compare `snapshot` against `manifest`.
pub fn compute(snapshot: &Snapshot, manifest: &Manifest) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (path, state) in &snapshot.files {
        let change = || Change {
            path: path.clone(),
            abs_path: state.abs_path.clone(),
            hash: state.hash.clone(),
        };
        match manifest.get(path) {
            None => changes.added.push(change()),
            Some(known) if known != state.hash => changes.modified.push(change()),
            Some(_) => changes.unchanged += 1,
        }
    }

    changes.removed = manifest
        .files
        .keys()
        .filter(|p| !snapshot.files.contains_key(*p) && !snapshot.shadows(p))
        .cloned()
        .collect();

    changes
}

/// Like [`compute`], but every file on disk is re-ingested.
pub fn compute_full(snapshot: &Snapshot, manifest: &Manifest) -> ChangeSet {
    let mut changes = compute(snapshot, manifest);
    if changes.unchanged == 0 {
        return changes;
    }

    let pending: BTreeSet<&str> = changes
        .added
        .iter()
        .chain(changes.modified.iter())
        .map(|c| c.path.as_str())
        .collect();
    let forced: Vec<Change> = snapshot
        .files
        .iter()
        .filter(|(path, _)| !pending.contains(path.as_str()))
        .map(|(path, state)| Change {
            path: path.clone(),
            abs_path: state.abs_path.clone(),
            hash: state.hash.clone(),
        })
        .collect();

    changes.modified.extend(forced);
    changes.modified.sort_by(|a, b| a.path.cmp(&b.path));
    changes.unchanged = 0;
    changes
}
