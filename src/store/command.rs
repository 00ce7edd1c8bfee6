//! [`Store`] backed by an external MCP RAG server, driven through a CLI
//! client.
//!
//! Every operation spawns
//! `<client_command> <tool> --params <json> <server_command>`, for example
//! `mcp call ingest_file --params '{"file":"/abs/src/a.py"}' npx -y mcp-local-rag`,
//! with `BASE_DIR` and `DB_PATH` set so the server uses the project's
//! security boundary and database. The server reads and chunks the file
//! itself, so the chunks passed to [`Store::ingest`] are not forwarded.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::chunk::Chunk;
use crate::config::Config;

use super::{IndexedFile, QueryHit, Store};

pub struct McpCommandStore {
    client_command: Vec<String>,
    server_command: Vec<String>,
    base_dir: PathBuf,
    db_path: PathBuf,
}

impl McpCommandStore {
    pub fn from_config(config: &Config) -> Self {
        Self {
            client_command: config.store.client_command.clone(),
            server_command: config.store.server_command.clone(),
            base_dir: config.base_dir.clone(),
            db_path: config.store_path(),
        }
    }

    async fn call(&self, tool: &str, params: Value) -> Result<String> {
        let (program, args) = self
            .client_command
            .split_first()
            .ok_or_else(|| anyhow!("store.client_command is empty"))?;

        debug!(tool, params = %params, "calling MCP tool");
        let output = Command::new(program)
            .args(args)
            .arg(tool)
            .arg("--params")
            .arg(params.to_string())
            .args(&self.server_command)
            .env("BASE_DIR", &self.base_dir)
            .env("DB_PATH", &self.db_path)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("failed to spawn '{}'", program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} exited with {}: {}", tool, output.status, stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn file_param(&self, path: &str) -> Value {
        json!({ "file": self.base_dir.join(path).to_string_lossy() })
    }
}

/// Pull an array of result objects out of the client's stdout. Accepts a
/// bare array or an object wrapping one under `results` or `files`.
fn result_array(stdout: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(stdout.trim())
        .context("unrecognized output from MCP client (expected JSON)")?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => obj
            .remove("results")
            .or_else(|| obj.remove("files"))
            .and_then(|v| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .ok_or_else(|| anyhow!("unrecognized output from MCP client (no result array)")),
        _ => bail!("unrecognized output from MCP client"),
    }
}

fn str_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn num_field(item: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| item.get(*k).and_then(Value::as_f64))
}

#[async_trait]
impl Store for McpCommandStore {
    fn name(&self) -> &str {
        "mcp"
    }

    async fn ingest(&self, path: &str, _chunks: &[Chunk]) -> Result<()> {
        self.call("ingest_file", self.file_param(path)).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.call("delete_file", self.file_param(path)).await?;
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>> {
        let stdout = self
            .call("query_documents", json!({ "query": text, "limit": k }))
            .await?;
        let base = self.base_dir.to_string_lossy().to_string();

        let mut hits: Vec<QueryHit> = result_array(&stdout)?
            .iter()
            .filter_map(|item| {
                let path = str_field(item, &["filePath", "path", "file"])?;
                let path = path
                    .strip_prefix(&base)
                    .map(|p| p.trim_start_matches('/').to_string())
                    .unwrap_or(path);
                Some(QueryHit {
                    path,
                    chunk_text: str_field(item, &["text", "content"]).unwrap_or_default(),
                    score: num_field(item, &["score"]).unwrap_or(0.0),
                    start_line: 0,
                    end_line: 0,
                })
            })
            .collect();
        hits.truncate(k);
        Ok(hits)
    }

    async fn list_files(&self) -> Result<Vec<IndexedFile>> {
        let stdout = self.call("list_files", json!({})).await?;
        let base = self.base_dir.to_string_lossy().to_string();
        Ok(result_array(&stdout)?
            .iter()
            .filter_map(|item| {
                let path = str_field(item, &["filePath", "path", "file"])?;
                let path = path
                    .strip_prefix(&base)
                    .map(|p| p.trim_start_matches('/').to_string())
                    .unwrap_or(path);
                let chunks = num_field(item, &["chunkCount", "chunks"]).unwrap_or(0.0) as usize;
                Some(IndexedFile { path, chunks })
            })
            .collect())
    }
}
