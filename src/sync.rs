//! Sync orchestration.
//!
//! One call is one run of the state machine
//!
//! ```text
//! LOAD_CONFIG → ACQUIRE_LOCK → LOAD_MANIFEST → WALK_AND_HASH → DIFF
//!     ├─ empty change-set ─────────────────────────────────────────→ DONE
//!     └─ OPEN_STORE → APPLY_CHANGES → CLOSE_STORE → SAVE_MANIFEST → DONE
//! ```
//!
//! Nothing is kept between runs except the manifest file. Fatal errors
//! surface as `Err`; per-file errors are collected in the [`SyncReport`].

use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{load_config, Config};
use crate::diff::{self, ChangeSet, Snapshot};
use crate::error::{Result, SyncError};
use crate::ingest::IngestionAdapter;
use crate::lock::SyncLock;
use crate::manifest::{Manifest, ManifestStore};
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::store::{open_store, Store};
use crate::walker::Walker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    LoadConfig,
    AcquireLock,
    LoadManifest,
    WalkAndHash,
    Diff,
    OpenStore,
    ApplyChanges,
    CloseStore,
    SaveManifest,
    Done,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Re-ingest every candidate, not just changed ones.
    pub full: bool,
    /// Compute the change-set and stop.
    pub dry_run: bool,
}

/// Everything a run knows before touching the store.
#[derive(Debug)]
pub struct SyncPlan {
    pub manifest: Manifest,
    pub snapshot: Snapshot,
    pub changes: ChangeSet,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    /// Nothing changed; the store was not opened and the manifest not written.
    pub noop: bool,
    pub dry_run: bool,
    pub changes: ChangeSet,
    pub updated: usize,
    pub removed: usize,
    pub chunks_written: usize,
    /// Per-file store or read failures while applying; retried next run.
    pub failures: Vec<SyncError>,
    /// Files or directories that could not be read during the walk.
    pub skipped: Vec<SyncError>,
    pub manifest_saved: bool,
}

impl SyncReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

fn enter(phase: SyncPhase) {
    debug!(?phase, "sync phase");
}

/// Load config from `rag_dir` and run one sync against the configured store.
pub async fn run_sync(
    rag_dir: &Path,
    options: SyncOptions,
    progress: &dyn SyncProgressReporter,
) -> Result<SyncReport> {
    enter(SyncPhase::LoadConfig);
    let config = load_config(rag_dir)?;
    run(&config, None, options, progress).await
}

/// Run one sync against a caller-owned store. The caller opens and closes it.
pub async fn run_sync_with_store(
    config: &Config,
    store: &dyn Store,
    options: SyncOptions,
    progress: &dyn SyncProgressReporter,
) -> Result<SyncReport> {
    run(config, Some(store), options, progress).await
}

/// Walk, hash and diff without taking the lock or touching the store.
pub fn plan(config: &Config, full: bool) -> Result<SyncPlan> {
    enter(SyncPhase::LoadManifest);
    let manifest = ManifestStore::new(config.manifest_path()).load();

    enter(SyncPhase::WalkAndHash);
    let walker = Walker::new(config)?;
    let snapshot = walker.snapshot()?;

    enter(SyncPhase::Diff);
    let changes = if full {
        diff::compute_full(&snapshot, &manifest)
    } else {
        diff::compute(&snapshot, &manifest)
    };

    Ok(SyncPlan {
        manifest,
        snapshot,
        changes,
    })
}

async fn run(
    config: &Config,
    store: Option<&dyn Store>,
    options: SyncOptions,
    progress: &dyn SyncProgressReporter,
) -> Result<SyncReport> {
    let started = Instant::now();

    enter(SyncPhase::AcquireLock);
    let _lock = SyncLock::acquire(
        &config.lock_path(),
        Duration::from_secs(config.lock_timeout_secs),
    )
    .await?;

    progress.report(SyncProgressEvent::Scanning);
    let SyncPlan {
        manifest,
        snapshot,
        changes,
    } = plan(config, options.full)?;

    progress.report(SyncProgressEvent::Planned {
        changes: changes.len() as u64,
        unchanged: changes.unchanged as u64,
    });

    let mut report = SyncReport {
        dry_run: options.dry_run,
        skipped: snapshot.errors,
        ..Default::default()
    };

    if changes.is_empty() {
        enter(SyncPhase::Done);
        debug!(
            unchanged = changes.unchanged,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index up to date"
        );
        report.noop = true;
        report.changes = changes;
        return Ok(report);
    }

    info!(
        added = changes.added.len(),
        modified = changes.modified.len(),
        removed = changes.removed.len(),
        "changes detected"
    );

    if options.dry_run {
        enter(SyncPhase::Done);
        report.changes = changes;
        return Ok(report);
    }

    let outcome = match store {
        Some(store) => {
            enter(SyncPhase::ApplyChanges);
            IngestionAdapter::new(store, &config.chunking)
                .apply(&changes, progress)
                .await
        }
        None => {
            enter(SyncPhase::OpenStore);
            let owned = open_store(config).await.map_err(SyncError::Store)?;
            debug!(backend = owned.name(), "store session opened");

            enter(SyncPhase::ApplyChanges);
            let outcome = IngestionAdapter::new(owned.as_ref(), &config.chunking)
                .apply(&changes, progress)
                .await;

            enter(SyncPhase::CloseStore);
            if let Err(e) = owned.close().await {
                warn!(error = %format!("{:#}", e), "failed to close store session");
            }
            outcome
        }
    };

    report.updated = outcome.ingested.len();
    report.removed = outcome.deleted.len();
    report.chunks_written = outcome.chunks_written;

    if !outcome.ingested.is_empty() || !outcome.deleted.is_empty() {
        enter(SyncPhase::SaveManifest);
        let mut next = manifest;
        for (path, hash) in outcome.ingested {
            next.files.insert(path, hash);
        }
        for path in &outcome.deleted {
            next.files.remove(path);
        }
        next.last_sync = Some(chrono::Utc::now());
        ManifestStore::new(config.manifest_path()).save(&next)?;
        report.manifest_saved = true;
    } else {
        warn!("no change reached the store, manifest left untouched");
    }

    enter(SyncPhase::Done);
    info!(
        updated = report.updated,
        removed = report.removed,
        failed = outcome.failures.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "sync finished"
    );

    report.failures = outcome.failures;
    report.changes = changes;
    Ok(report)
}
