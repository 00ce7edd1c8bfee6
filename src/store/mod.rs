//! Storage abstraction for the retrieval index.
//!
//! The sync engine only needs three things from a vector database: replace
//! the chunks stored for a path, drop a path, and (for the query façade)
//! rank chunks against a text. The [`Store`] trait captures exactly that so
//! the diff and ingestion logic never depend on a concrete backend.
//!
//! | Backend | Module | Notes |
//! |---------|--------|-------|
//! | SQLite + FTS5 | [`sqlite`] | Default. BM25-ranked keyword retrieval |
//! | External MCP server | [`command`] | Shells out per file; chunking done by the server |
//! | In-memory | [`memory`] | Tests and embedding |

pub mod command;
pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::chunk::Chunk;
use crate::config::{Config, StoreBackend};

/// A ranked chunk returned from [`Store::query`].
#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    pub path: String,
    pub chunk_text: String,
    /// Higher is better.
    pub score: f64,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IndexedFile {
    pub path: String,
    pub chunks: usize,
}

/// Abstract vector store.
///
/// `ingest` must replace whatever was stored for `path` before, so replaying
/// an ingest after an interrupted run is harmless. `delete` of an unknown path
/// succeeds.
#[async_trait]
pub trait Store: Send + Sync {
    fn name(&self) -> &str;

    async fn ingest(&self, path: &str, chunks: &[Chunk]) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;

    async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>>;

    async fn list_files(&self) -> Result<Vec<IndexedFile>>;

    /// Release the session. Called once at the end of every run that opened it.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Open the backend named in `config.store`.
pub async fn open_store(config: &Config) -> Result<Box<dyn Store>> {
    match config.store.backend {
        StoreBackend::Sqlite => {
            let store = sqlite::SqliteStore::open(&config.store_path()).await?;
            Ok(Box::new(store))
        }
        StoreBackend::Mcp => Ok(Box::new(command::McpCommandStore::from_config(config))),
    }
}
