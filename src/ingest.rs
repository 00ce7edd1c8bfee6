//! Applies a [`ChangeSet`] to a [`Store`].
//!
//! Each file is handled on its own: a read error or a failed store call is
//! recorded in the [`ApplyReport`] and the batch moves on. Only files that
//! actually reached the store show up in `ingested`/`deleted`, and only
//! those get their manifest entries updated by the caller.

use tracing::{debug, warn};

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::diff::{Change, ChangeSet};
use crate::error::SyncError;
use crate::manifest::hash_bytes;
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::store::Store;

/// Outcome of applying one change-set.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// `(path, hash of the bytes that were ingested)`.
    pub ingested: Vec<(String, String)>,
    pub deleted: Vec<String>,
    pub failures: Vec<SyncError>,
    pub chunks_written: usize,
}

pub struct IngestionAdapter<'a> {
    store: &'a dyn Store,
    chunking: &'a ChunkingConfig,
}

impl<'a> IngestionAdapter<'a> {
    pub fn new(store: &'a dyn Store, chunking: &'a ChunkingConfig) -> Self {
        Self { store, chunking }
    }

    /// Read, chunk and submit one file. Returns the hash of the content
    /// that was submitted and the number of chunks.
    ///
    /// The file is re-read here rather than trusting the walk-time hash: if
    /// it changed in between, the manifest records what the store holds.
    pub async fn ingest(&self, change: &Change) -> Result<(String, usize), SyncError> {
        let bytes = tokio::fs::read(&change.abs_path)
            .await
            .map_err(|source| SyncError::Filesystem {
                path: change.abs_path.clone(),
                source,
            })?;
        let hash = hash_bytes(&bytes);
        if hash != change.hash {
            debug!(path = %change.path, "file changed since walk, ingesting current content");
        }

        let text = String::from_utf8_lossy(&bytes);
        let chunks = chunk_text(
            &text,
            self.chunking.max_tokens,
            self.chunking.overlap_tokens,
        );

        self.store
            .ingest(&change.path, &chunks)
            .await
            .map_err(|e| SyncError::Ingestion {
                path: change.path.clone(),
                message: format!("{:#}", e),
            })?;

        Ok((hash, chunks.len()))
    }

    pub async fn delete(&self, path: &str) -> Result<(), SyncError> {
        self.store
            .delete(path)
            .await
            .map_err(|e| SyncError::Ingestion {
                path: path.to_string(),
                message: format!("delete: {:#}", e),
            })
    }

    /// Removals first, then additions, then modifications.
    pub async fn apply(
        &self,
        changes: &ChangeSet,
        progress: &dyn SyncProgressReporter,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();
        let total = changes.len() as u64;
        let mut n = 0u64;

        for path in &changes.removed {
            match self.delete(path).await {
                Ok(()) => {
                    debug!(path = %path, "removed from index");
                    report.deleted.push(path.clone());
                }
                Err(e) => {
                    warn!(error = %e, "delete failed, will retry next sync");
                    report.failures.push(e);
                }
            }
            n += 1;
            progress.report(SyncProgressEvent::Applying { n, total });
        }

        for change in changes.added.iter().chain(changes.modified.iter()) {
            match self.ingest(change).await {
                Ok((hash, chunk_count)) => {
                    debug!(path = %change.path, chunks = chunk_count, "ingested");
                    report.chunks_written += chunk_count;
                    report.ingested.push((change.path.clone(), hash));
                }
                Err(e) => {
                    warn!(error = %e, "ingest failed, will retry next sync");
                    report.failures.push(e);
                }
            }
            n += 1;
            progress.report(SyncProgressEvent::Applying { n, total });
        }

        report
    }
}
