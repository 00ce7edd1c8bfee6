//! In-memory [`Store`] implementation for tests and embedding.
//!
//! Chunks live in a `BTreeMap` behind `std::sync::RwLock`. Query scoring is
//! a plain term-frequency count over lowercased words.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::chunk::Chunk;

use super::{IndexedFile, QueryHit, Store};

#[derive(Default)]
pub struct InMemoryStore {
    files: RwLock<BTreeMap<String, Vec<Chunk>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    pub fn chunks(&self, path: &str) -> Vec<Chunk> {
        self.files
            .read()
            .ok()
            .and_then(|files| files.get(path).cloned())
            .unwrap_or_default()
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait]
impl Store for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ingest(&self, path: &str, chunks: &[Chunk]) -> Result<()> {
        let mut files = self.files.write().map_err(|_| anyhow!("store lock poisoned"))?;
        files.insert(path.to_string(), chunks.to_vec());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut files = self.files.write().map_err(|_| anyhow!("store lock poisoned"))?;
        files.remove(path);
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>> {
        let wanted = terms(text);
        if wanted.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let files = self.files.read().map_err(|_| anyhow!("store lock poisoned"))?;
        let mut hits: Vec<QueryHit> = Vec::new();
        for (path, chunks) in files.iter() {
            for chunk in chunks {
                let words = terms(&chunk.text);
                let score = words.iter().filter(|w| wanted.contains(w)).count();
                if score > 0 {
                    hits.push(QueryHit {
                        path: path.clone(),
                        chunk_text: chunk.text.clone(),
                        score: score as f64,
                        start_line: chunk.position.start_line,
                        end_line: chunk.position.end_line,
                    });
                }
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
                .then_with(|| a.start_line.cmp(&b.start_line))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn list_files(&self) -> Result<Vec<IndexedFile>> {
        let files = self.files.read().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(files
            .iter()
            .map(|(path, chunks)| IndexedFile {
                path: path.clone(),
                chunks: chunks.len(),
            })
            .collect())
    }
}
