//! Persisted path → content-hash manifest.
//!
//! The manifest records, for every file ingested by the last successful
//! sync, the SHA-256 of the bytes that were ingested. It lives next to the
//! config as `.sync_manifest.json` and is only ever replaced whole: writes go
//! to a temp file in the same directory which is then renamed into place, so
//! a reader sees either the previous manifest or the new one. On Unix the
//! directory is fsynced after the rename so the new entry survives a crash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

const HASH_BLOCK_SIZE: usize = 64 * 1024;
const HASH_PREFIX: &str = "sha256:";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the manifest. A missing file is a first run; an unreadable or
    /// unparseable one is logged and treated the same way, which forces a
    /// full re-ingest.
    pub fn load(&self) -> Manifest {
        match self.try_load() {
            Ok(Some(manifest)) => manifest,
            Ok(None) => {
                debug!(path = %self.path.display(), "no manifest yet, starting empty");
                Manifest::new()
            }
            Err(e) => {
                warn!(error = %e, "discarding manifest, every file will be re-ingested");
                Manifest::new()
            }
        }
    }

    fn try_load(&self) -> Result<Option<Manifest>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SyncError::ManifestCorruption {
                    path: self.path.clone(),
                    message: e.to_string(),
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| SyncError::ManifestCorruption {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    /// Durably replace the manifest with `manifest`.
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        let write_err = |source: std::io::Error| SyncError::ManifestWrite {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(write_err)?;

        let json = serde_json::to_vec_pretty(manifest).map_err(|e| write_err(e.into()))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".sync_manifest.")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(write_err)?;
        tmp.write_all(&json).map_err(write_err)?;
        tmp.write_all(b"\n").map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        // The new manifest is already in place; a failed directory sync only
        // weakens durability.
        if let Err(e) = sync_dir(dir) {
            warn!(dir = %dir.display(), error = %e, "failed to sync manifest directory");
        }

        debug!(path = %self.path.display(), entries = manifest.len(), "manifest saved");
        Ok(())
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// SHA-256 of a file's raw bytes, as `sha256:<hex>`.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BLOCK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{}{}", HASH_PREFIX, hex::encode(hasher.finalize())))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{}{}", HASH_PREFIX, hex::encode(Sha256::digest(bytes)))
}
