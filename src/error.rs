//! Error taxonomy for the sync engine.
//!
//! Errors split into two classes. Fatal errors (`Config`,
//! `BaseDirUnreadable`, `LockTimeout`, `ManifestWrite`, `Store`) abort a run
//! before or instead of persisting anything. Per-item errors (`Filesystem`,
//! `Ingestion`) are collected into the [`SyncReport`](crate::sync::SyncReport)
//! and never abort the batch.
//! `ManifestCorruption` is downgraded by the manifest store itself to an
//! empty manifest and only ever surfaces in logs.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("config error: {0}")]
    Config(String),

    #[error("base directory {} is unreadable: {source}", path.display())]
    BaseDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ingestion failed for {path}: {message}")]
    Ingestion { path: String, message: String },

    #[error("manifest {} is unreadable: {message}", path.display())]
    ManifestCorruption { path: PathBuf, message: String },

    #[error("failed to write manifest {}: {source}", path.display())]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {secs}s waiting for another sync to release {}", path.display())]
    LockTimeout { path: PathBuf, secs: u64 },

    #[error("store error: {0:#}")]
    Store(anyhow::Error),
}

impl SyncError {
    pub fn config(msg: impl Into<String>) -> Self {
        SyncError::Config(msg.into())
    }

    /// True for errors that abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_)
                | SyncError::BaseDirUnreadable { .. }
                | SyncError::ManifestWrite { .. }
                | SyncError::LockTimeout { .. }
                | SyncError::Store(_)
        )
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
