//! Candidate file enumeration.
//!
//! Walks each included path under `base_dir`, keeping regular files whose
//! name ends in one of the configured extensions. Directory entries are
//! visited in file-name order, so two walks over the same tree yield the
//! same sequence. The rag dir and the store location are pruned: the index
//! never indexes itself.
//!
//! Symlinked directories are only entered with `follow_symlinks`; a symlink
//! to a regular file is always a candidate.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::Config;
use crate::diff::{FileState, Snapshot};
use crate::error::{Result, SyncError};
use crate::manifest::hash_file;

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Path relative to `base_dir`, `/`-separated.
    pub rel_path: String,
    pub abs_path: PathBuf,
}

pub struct Walker<'a> {
    config: &'a Config,
    exclude_set: GlobSet,
    storage_paths: Vec<PathBuf>,
}

impl<'a> Walker<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        patterns.extend(config.exclude_globs.iter().cloned());
        let exclude_set = build_globset(&patterns)?;

        Ok(Self {
            config,
            exclude_set,
            storage_paths: config.storage_paths(),
        })
    }

    /// Lazily walk all included paths. Each call starts a fresh walk.
    pub fn iter(&self) -> impl Iterator<Item = Result<CandidateFile>> + '_ {
        self.config
            .included_paths
            .iter()
            .flat_map(move |rel| self.walk_included(rel))
    }

    /// Walk and hash every candidate. Unreadable entries are logged and
    /// recorded so their manifest entries survive this run.
    ///
    /// An unreadable base directory is fatal: every manifest entry lies
    /// beneath it, so an empty walk would look like a mass deletion.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let base = &self.config.base_dir;
        std::fs::read_dir(base).map_err(|source| SyncError::BaseDirUnreadable {
            path: base.clone(),
            source,
        })?;

        let mut snapshot = Snapshot::default();

        for item in self.iter() {
            match item {
                Ok(file) => {
                    if snapshot.files.contains_key(&file.rel_path) {
                        continue;
                    }
                    match hash_file(&file.abs_path) {
                        Ok(hash) => {
                            snapshot.files.insert(
                                file.rel_path,
                                FileState {
                                    abs_path: file.abs_path,
                                    hash,
                                },
                            );
                        }
                        Err(source) => {
                            let err = SyncError::Filesystem {
                                path: file.abs_path,
                                source,
                            };
                            warn!(error = %err, "skipping file this run");
                            snapshot.unreadable.insert(file.rel_path);
                            snapshot.errors.push(err);
                        }
                    }
                }
                Err(SyncError::Filesystem { path, source }) => {
                    let Some(rel) = self.relative(&path) else {
                        return Err(SyncError::BaseDirUnreadable { path, source });
                    };
                    let err = SyncError::Filesystem { path, source };
                    warn!(error = %err, "skipping unreadable path this run");
                    snapshot.unreadable.insert(rel);
                    snapshot.errors.push(err);
                }
                Err(err) => return Err(err),
            }
        }

        debug!(
            files = snapshot.files.len(),
            unreadable = snapshot.unreadable.len(),
            "walk complete"
        );
        Ok(snapshot)
    }

    fn walk_included(&self, rel: &str) -> Box<dyn Iterator<Item = Result<CandidateFile>> + '_> {
        let root = self.config.base_dir.join(rel);
        match root.try_exists() {
            Ok(true) => {}
            Ok(false) => {
                debug!(path = %rel, "included path does not exist, skipping");
                return Box::new(std::iter::empty());
            }
            Err(source) => {
                return Box::new(std::iter::once(Err(SyncError::Filesystem {
                    path: root,
                    source,
                })));
            }
        }

        let walker = WalkDir::new(&root)
            .follow_links(self.config.follow_symlinks)
            .sort_by_file_name();

        Box::new(
            walker
                .into_iter()
                .filter_entry(move |entry| !self.is_storage(entry.path()))
                .filter_map(move |entry| match entry {
                    Ok(entry) => self.accept(&entry).map(Ok),
                    Err(err) => Some(Err(walk_error(err, &root))),
                }),
        )
    }

    fn accept(&self, entry: &DirEntry) -> Option<CandidateFile> {
        let path = entry.path();
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            // Not followed while walking; a link to a regular file is still a candidate.
            let target = std::fs::canonicalize(path).ok()?;
            if !target.is_file() || self.is_storage(&target) {
                return None;
            }
        } else if !file_type.is_file() {
            return None;
        }
        let name = entry.file_name().to_string_lossy();
        if !self.matches_extension(&name) {
            return None;
        }

        let rel_path = self.relative(path)?;
        if self.exclude_set.is_match(&rel_path) {
            return None;
        }

        Some(CandidateFile {
            rel_path,
            abs_path: path.to_path_buf(),
        })
    }

    fn matches_extension(&self, name: &str) -> bool {
        self.config
            .extensions
            .iter()
            .any(|ext| name.len() > ext.len() && name.ends_with(ext.as_str()))
    }

    fn is_storage(&self, path: &Path) -> bool {
        self.storage_paths.iter().any(|p| path.starts_with(p))
    }

    /// `path` relative to `base_dir`, normalized to `/` separators.
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.config.base_dir).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }
}

fn walk_error(err: walkdir::Error, root: &Path) -> SyncError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let message = err.to_string();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other(message));
    SyncError::Filesystem { path, source }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| SyncError::config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| SyncError::config(format!("invalid glob set: {}", e)))
}
