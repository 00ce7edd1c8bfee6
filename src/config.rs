//! Index configuration, read from `<rag_dir>/config.toml`.
//!
//! The file is written once by the installer and only read here. The three
//! top-level keys `base_dir`, `included_paths` and `extensions` are required;
//! the rest fall back to defaults.
//!
//! ```toml
//! base_dir = "/home/me/project"
//! included_paths = ["src", "tests", "README.md"]
//! extensions = [".py", ".md", ".txt"]
//!
//! [store]
//! backend = "sqlite"
//! ```

use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, SyncError};

pub const CONFIG_FILE: &str = "config.toml";
pub const MANIFEST_FILE: &str = ".sync_manifest.json";
pub const LOCK_FILE: &str = ".sync.lock";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub base_dir: PathBuf,
    pub included_paths: Vec<String>,
    pub extensions: BTreeSet<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Directory the config was loaded from. Holds the manifest and lock file.
    #[serde(skip)]
    pub rag_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
        }
    }
}

fn default_max_tokens() -> usize {
    256
}
fn default_overlap() -> usize {
    32
}
fn default_lock_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Mcp,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Store location; relative paths resolve against the rag dir.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_client_command")]
    pub client_command: Vec<String>,
    #[serde(default = "default_server_command")]
    pub server_command: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            client_command: default_client_command(),
            server_command: default_server_command(),
        }
    }
}

fn default_client_command() -> Vec<String> {
    vec!["mcp".to_string(), "call".to_string()]
}
fn default_server_command() -> Vec<String> {
    vec![
        "npx".to_string(),
        "-y".to_string(),
        "mcp-local-rag".to_string(),
    ]
}

impl Config {
    pub fn manifest_path(&self) -> PathBuf {
        self.rag_dir.join(MANIFEST_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.rag_dir.join(LOCK_FILE)
    }

    /// Resolved location of the backing store.
    pub fn store_path(&self) -> PathBuf {
        match &self.store.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => self.rag_dir.join(p),
            None => match self.store.backend {
                StoreBackend::Sqlite => self.rag_dir.join("index.sqlite"),
                StoreBackend::Mcp => self.rag_dir.join("lancedb"),
            },
        }
    }

    /// Paths the walker must never descend into: the index's own storage.
    /// Resolved through symlinks when they exist, like `rag_dir`.
    pub fn storage_paths(&self) -> Vec<PathBuf> {
        let store = self.store_path();
        let store = std::fs::canonicalize(&store).unwrap_or(store);
        vec![self.rag_dir.clone(), store]
    }
}

/// Load and validate `<rag_dir>/config.toml`.
pub fn load_config(rag_dir: &Path) -> Result<Config> {
    let path = rag_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&path).map_err(|e| {
        SyncError::config(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_config(rag_dir, &content)
}

/// Parse and validate config text as if it had been read from `rag_dir`.
pub fn parse_config(rag_dir: &Path, content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content)
        .map_err(|e| SyncError::config(format!("failed to parse config file: {}", e)))?;

    if !config.base_dir.is_absolute() {
        return Err(SyncError::config(format!(
            "base_dir must be an absolute path, got '{}'",
            config.base_dir.display()
        )));
    }
    if !config.base_dir.is_dir() {
        return Err(SyncError::config(format!(
            "base_dir does not exist or is not a directory: {}",
            config.base_dir.display()
        )));
    }
    config.base_dir = std::fs::canonicalize(&config.base_dir).map_err(|e| {
        SyncError::config(format!(
            "base_dir is unreadable: {}: {}",
            config.base_dir.display(),
            e
        ))
    })?;
    if let Err(e) = std::fs::read_dir(&config.base_dir) {
        return Err(SyncError::config(format!(
            "base_dir cannot be listed: {}: {}",
            config.base_dir.display(),
            e
        )));
    }
    config.rag_dir = std::fs::canonicalize(rag_dir).unwrap_or_else(|_| rag_dir.to_path_buf());

    if config.extensions.is_empty() {
        return Err(SyncError::config("extensions must not be empty"));
    }
    for ext in &config.extensions {
        if !ext.starts_with('.') || ext.len() < 2 {
            return Err(SyncError::config(format!(
                "extension '{}' must start with '.' followed by a suffix, e.g. \".md\"",
                ext
            )));
        }
    }

    for rel in &config.included_paths {
        let p = Path::new(rel);
        if p.is_absolute() || p.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(SyncError::config(format!(
                "included path '{}' must be relative to base_dir and stay inside it",
                rel
            )));
        }
    }

    for pattern in &config.exclude_globs {
        globset::Glob::new(pattern).map_err(|e| {
            SyncError::config(format!("invalid exclude glob '{}': {}", pattern, e))
        })?;
    }

    if config.chunking.max_tokens == 0 {
        return Err(SyncError::config("chunking.max_tokens must be > 0"));
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        return Err(SyncError::config(
            "chunking.overlap_tokens must be smaller than chunking.max_tokens",
        ));
    }

    if config.store.backend == StoreBackend::Mcp
        && (config.store.client_command.is_empty() || config.store.server_command.is_empty())
    {
        return Err(SyncError::config(
            "store.client_command and store.server_command must not be empty for the mcp backend",
        ));
    }

    Ok(config)
}
