use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use rag_sync::chunk::Chunk;
use rag_sync::config::{load_config, Config};
use rag_sync::error::SyncError;
use rag_sync::manifest::{hash_bytes, Manifest, ManifestStore};
use rag_sync::progress::NoProgress;
use rag_sync::store::memory::InMemoryStore;
use rag_sync::store::{IndexedFile, QueryHit, Store};
use rag_sync::sync::{run_sync_with_store, SyncOptions};

/// In-memory store that records every call and can be told to fail
/// ingests for specific paths.
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryStore,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    down: Mutex<bool>,
}

impl RecordingStore {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn fail_on(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    fn heal(&self) {
        self.failing.lock().unwrap().clear();
        *self.down.lock().unwrap() = false;
    }

    fn take_down(&self) {
        *self.down.lock().unwrap() = true;
    }
}

#[async_trait]
impl Store for RecordingStore {
    fn name(&self) -> &str {
        "recording"
    }

    async fn ingest(&self, path: &str, chunks: &[Chunk]) -> Result<()> {
        self.calls.lock().unwrap().push(format!("ingest {}", path));
        if *self.down.lock().unwrap() {
            bail!("connection refused");
        }
        if self.failing.lock().unwrap().contains(path) {
            bail!("embedding service rejected {}", path);
        }
        self.inner.ingest(path, chunks).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("delete {}", path));
        if *self.down.lock().unwrap() {
            bail!("connection refused");
        }
        self.inner.delete(path).await
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>> {
        self.inner.query(text, k).await
    }

    async fn list_files(&self) -> Result<Vec<IndexedFile>> {
        self.inner.list_files().await
    }
}

/// Project with `src/a.py`, `b.md` and a rag dir inside the base dir.
fn setup_project() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().to_path_buf();

    fs::create_dir_all(base.join("src")).unwrap();
    fs::write(base.join("src/a.py"), "def handler():\n    return 'ok'\n").unwrap();
    fs::write(base.join("b.md"), "# Notes\n\nDeploy with helm.\n").unwrap();

    let rag = base.join("rag");
    fs::create_dir_all(&rag).unwrap();
    fs::write(
        rag.join("config.toml"),
        format!(
            r#"base_dir = "{}"
included_paths = ["src", "b.md", "c.txt", "rag"]
extensions = [".py", ".md", ".txt", ".json", ".toml"]
lock_timeout_secs = 10
"#,
            base.display()
        ),
    )
    .unwrap();

    (tmp, rag)
}

fn config(rag: &Path) -> Config {
    load_config(rag).unwrap()
}

fn manifest(cfg: &Config) -> Manifest {
    ManifestStore::new(cfg.manifest_path()).load()
}

async fn sync(cfg: &Config, store: &dyn Store) -> rag_sync::sync::SyncReport {
    run_sync_with_store(cfg, store, SyncOptions::default(), &NoProgress)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_first_sync_ingests_everything() {
    let (_tmp, rag) = setup_project();
    let cfg = config(&rag);
    let store = RecordingStore::default();

    let report = sync(&cfg, &store).await;
    assert!(!report.noop);
    assert_eq!(report.updated, 2);
    assert_eq!(report.removed, 0);
    assert_eq!(report.failed(), 0);
    assert!(report.manifest_saved);
    assert_eq!(store.calls(), vec!["ingest b.md", "ingest src/a.py"]);

    let m = manifest(&cfg);
    assert_eq!(m.len(), 2);
    assert!(m.last_sync.is_some());
    assert_eq!(
        m.get("src/a.py"),
        Some(hash_bytes(b"def handler():\n    return 'ok'\n").as_str())
    );
}

#[tokio::test]
async fn test_second_sync_is_a_noop() {
    let (_tmp, rag) = setup_project();
    let cfg = config(&rag);
    let store = RecordingStore::default();

    sync(&cfg, &store).await;
    let before = fs::read(cfg.manifest_path()).unwrap();
    store.clear_calls();

    let report = sync(&cfg, &store).await;
    assert!(report.noop);
    assert!(report.changes.is_empty());
    assert_eq!(report.changes.unchanged, 2);
    assert!(store.calls().is_empty());
    assert!(!report.manifest_saved);
    assert_eq!(fs::read(cfg.manifest_path()).unwrap(), before);
}

#[tokio::test]
async fn test_new_file_is_the_only_addition() {
    let (tmp, rag) = setup_project();
    let cfg = config(&rag);
    let store = RecordingStore::default();

    // Manifest = {a.py: H1}; candidates = {a.py, b.md}.
    let mut seeded = Manifest::new();
    seeded.files.insert(
        "src/a.py".to_string(),
        hash_bytes(&fs::read(tmp.path().join("src/a.py")).unwrap()),
    );
    ManifestStore::new(cfg.manifest_path()).save(&seeded).unwrap();

    let report = sync(&cfg, &store).await;
    assert_eq!(report.changes.added.len(), 1);
    assert_eq!(report.changes.added[0].path, "b.md");
    assert!(report.changes.modified.is_empty());
    assert!(report.changes.removed.is_empty());
    assert_eq!(store.calls(), vec!["ingest b.md"]);

    let m = manifest(&cfg);
    assert_eq!(
        m.files.keys().collect::<Vec<_>>(),
        vec!["b.md", "src/a.py"]
    );
}

#[tokio::test]
async fn test_deleted_file_produces_one_delete() {
    let (tmp, rag) = setup_project();
    fs::write(tmp.path().join("c.txt"), "scratch\n").unwrap();
    let cfg = config(&rag);
    let store = RecordingStore::default();

    sync(&cfg, &store).await;
    assert_eq!(manifest(&cfg).len(), 3);
    store.clear_calls();

    fs::remove_file(tmp.path().join("c.txt")).unwrap();
    let report = sync(&cfg, &store).await;
    assert_eq!(report.changes.removed, vec!["c.txt"]);
    assert_eq!(report.removed, 1);
    assert_eq!(store.calls(), vec!["delete c.txt"]);
    assert!(manifest(&cfg).get("c.txt").is_none());
    assert!(!store.inner.contains("c.txt"));
}

#[tokio::test]
async fn test_modified_file_is_reingested() {
    let (tmp, rag) = setup_project();
    let cfg = config(&rag);
    let store = RecordingStore::default();

    sync(&cfg, &store).await;
    store.clear_calls();

    fs::write(tmp.path().join("b.md"), "# Notes\n\nDeploy with argo.\n").unwrap();
    let report = sync(&cfg, &store).await;
    assert_eq!(report.changes.modified.len(), 1);
    assert_eq!(store.calls(), vec!["ingest b.md"]);
    assert_eq!(
        manifest(&cfg).get("b.md"),
        Some(hash_bytes(b"# Notes\n\nDeploy with argo.\n").as_str())
    );
}

#[tokio::test]
async fn test_failed_ingest_is_retried_alone() {
    let (_tmp, rag) = setup_project();
    let cfg = config(&rag);
    let store = RecordingStore::default();
    store.fail_on("src/a.py");

    let report = sync(&cfg, &store).await;
    assert_eq!(report.updated, 1);
    assert_eq!(report.failed(), 1);
    let m = manifest(&cfg);
    assert!(m.get("b.md").is_some());
    assert!(m.get("src/a.py").is_none());

    store.heal();
    store.clear_calls();
    let report = sync(&cfg, &store).await;
    assert_eq!(report.failed(), 0);
    assert_eq!(store.calls(), vec!["ingest src/a.py"]);
    assert_eq!(manifest(&cfg).len(), 2);
}

#[tokio::test]
async fn test_unreachable_store_leaves_manifest_untouched() {
    let (_tmp, rag) = setup_project();
    let cfg = config(&rag);
    let store = RecordingStore::default();

    sync(&cfg, &store).await;
    let before = fs::read(cfg.manifest_path()).unwrap();

    fs::write(rag.parent().unwrap().join("c.txt"), "new\n").unwrap();
    store.take_down();
    let report = sync(&cfg, &store).await;
    assert_eq!(report.updated, 0);
    assert_eq!(report.failed(), 1);
    assert!(!report.manifest_saved);
    assert_eq!(fs::read(cfg.manifest_path()).unwrap(), before);
}

#[tokio::test]
async fn test_corrupt_manifest_triggers_full_reingest() {
    let (_tmp, rag) = setup_project();
    let cfg = config(&rag);
    let store = RecordingStore::default();

    sync(&cfg, &store).await;
    fs::write(cfg.manifest_path(), "{\"files\": {\"b.md\": ").unwrap();
    store.clear_calls();

    let report = sync(&cfg, &store).await;
    assert_eq!(report.changes.added.len(), 2);
    assert_eq!(store.calls().len(), 2);
    assert_eq!(manifest(&cfg).len(), 2);
}

#[tokio::test]
async fn test_leftover_temp_file_does_not_shadow_manifest() {
    let (_tmp, rag) = setup_project();
    let cfg = config(&rag);
    let store = RecordingStore::default();

    sync(&cfg, &store).await;
    let before = manifest(&cfg);

    // A save interrupted before the rename leaves a partial temp file.
    let partial = tempfile::Builder::new()
        .prefix(".sync_manifest.")
        .suffix(".tmp")
        .tempfile_in(&rag)
        .unwrap();
    fs::write(partial.path(), "{\"files\": {\"src/a").unwrap();
    let _kept = partial.into_temp_path().keep().unwrap();

    assert_eq!(manifest(&cfg), before);
    store.clear_calls();
    let report = sync(&cfg, &store).await;
    assert!(report.noop);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_rag_dir_is_never_indexed() {
    let (_tmp, rag) = setup_project();
    let cfg = config(&rag);
    let store = RecordingStore::default();

    sync(&cfg, &store).await;
    sync(&cfg, &store).await;
    assert!(manifest(&cfg).files.keys().all(|p| !p.starts_with("rag")));
    assert!(store.calls().iter().all(|c| !c.contains("rag/")));
}

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let (_tmp, rag) = setup_project();
    let cfg = config(&rag);
    let store = RecordingStore::default();

    let options = SyncOptions {
        dry_run: true,
        ..Default::default()
    };
    let report = run_sync_with_store(&cfg, &store, options, &NoProgress)
        .await
        .unwrap();
    assert!(report.dry_run);
    assert_eq!(report.changes.added.len(), 2);
    assert!(store.calls().is_empty());
    assert!(!cfg.manifest_path().exists());
}

#[tokio::test]
async fn test_full_sync_reingests_unchanged_files() {
    let (_tmp, rag) = setup_project();
    let cfg = config(&rag);
    let store = RecordingStore::default();

    sync(&cfg, &store).await;
    store.clear_calls();

    let options = SyncOptions {
        full: true,
        ..Default::default()
    };
    let report = run_sync_with_store(&cfg, &store, options, &NoProgress)
        .await
        .unwrap();
    assert_eq!(report.changes.modified.len(), 2);
    assert_eq!(report.updated, 2);
    assert_eq!(store.calls().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_syncs_serialize() {
    let (_tmp, rag) = setup_project();
    let cfg = Arc::new(config(&rag));
    let store = Arc::new(RecordingStore::default());

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let cfg = Arc::clone(&cfg);
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                run_sync_with_store(&cfg, store.as_ref(), SyncOptions::default(), &NoProgress)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut noops = 0;
    for handle in handles {
        if handle.await.unwrap().noop {
            noops += 1;
        }
    }

    // Whoever runs second sees the first run's manifest.
    assert_eq!(noops, 1);
    assert_eq!(store.calls().len(), 2);
    let raw = fs::read_to_string(cfg.manifest_path()).unwrap();
    let parsed: Manifest = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed.len(), 2);
}

#[cfg(unix)]
fn chmod(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
}

#[cfg(unix)]
fn rewrite_included(rag: &Path, base: &Path, included: &str) {
    fs::write(
        rag.join("config.toml"),
        format!(
            "base_dir = \"{}\"\nincluded_paths = {}\nextensions = [\".py\", \".md\"]\nlock_timeout_secs = 10\n",
            base.display(),
            included
        ),
    )
    .unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_file_and_directory_keep_their_entries() {
    let (tmp, rag) = setup_project();
    let base = tmp.path();
    fs::create_dir_all(base.join("src/sub")).unwrap();
    fs::write(base.join("src/sub/d.py"), "D = 4\n").unwrap();
    let cfg = config(&rag);
    let store = RecordingStore::default();
    sync(&cfg, &store).await;
    let before = fs::read(cfg.manifest_path()).unwrap();
    assert_eq!(manifest(&cfg).len(), 3);

    chmod(&base.join("src/a.py"), 0o000);
    chmod(&base.join("src/sub"), 0o000);
    if fs::read(base.join("src/a.py")).is_ok() {
        // Permission bits are not enforced for this user.
        chmod(&base.join("src/sub"), 0o755);
        return;
    }
    store.clear_calls();

    let report = sync(&cfg, &store).await;
    chmod(&base.join("src/sub"), 0o755);
    chmod(&base.join("src/a.py"), 0o644);

    assert!(report.noop, "{:?}", report.changes);
    assert_eq!(report.skipped.len(), 2);
    assert!(store.calls().is_empty(), "{:?}", store.calls());
    assert_eq!(fs::read(cfg.manifest_path()).unwrap(), before);
}

#[cfg(unix)]
#[tokio::test]
async fn test_untraversable_parent_is_not_treated_as_deleted() {
    let (tmp, rag) = setup_project();
    let base = tmp.path();
    fs::create_dir_all(base.join("src/private")).unwrap();
    fs::write(base.join("src/a.md"), "# A\n").unwrap();
    fs::write(base.join("src/private/b.md"), "# B\n").unwrap();
    rewrite_included(&rag, base, r#"["src/a.md", "src/private/b.md"]"#);
    let cfg = config(&rag);
    let store = RecordingStore::default();
    sync(&cfg, &store).await;
    assert_eq!(manifest(&cfg).len(), 2);

    fs::write(base.join("src/a.md"), "# A, edited\n").unwrap();
    chmod(&base.join("src/private"), 0o600);
    if base.join("src/private/b.md").exists() {
        chmod(&base.join("src/private"), 0o755);
        return;
    }
    store.clear_calls();

    let report = sync(&cfg, &store).await;
    chmod(&base.join("src/private"), 0o755);

    assert_eq!(report.removed, 0);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(store.calls(), vec!["ingest src/a.md"]);
    let m = manifest(&cfg);
    assert!(m.files.contains_key("src/private/b.md"));
    assert_eq!(m.len(), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unlistable_base_dir_aborts_before_any_change() {
    let (tmp, rag) = setup_project();
    let base = tmp.path();
    rewrite_included(&rag, base, r#"["."]"#);
    let cfg = config(&rag);
    let store = RecordingStore::default();
    sync(&cfg, &store).await;
    let before = fs::read(cfg.manifest_path()).unwrap();
    assert_eq!(manifest(&cfg).len(), 2);

    chmod(base, 0o311);
    if fs::read_dir(base).is_ok() {
        chmod(base, 0o755);
        return;
    }
    store.clear_calls();

    let result = run_sync_with_store(&cfg, &store, SyncOptions::default(), &NoProgress).await;
    let reload = load_config(&rag);
    chmod(base, 0o755);

    let err = result.unwrap_err();
    assert!(matches!(err, SyncError::BaseDirUnreadable { .. }), "{}", err);
    assert!(err.is_fatal());
    assert!(store.calls().is_empty());
    assert_eq!(fs::read(cfg.manifest_path()).unwrap(), before);
    assert!(matches!(reload, Err(SyncError::Config(_))));
}
