//! Read-only commands: `status`, `files` and `query`.
//!
//! `status` and `files` never open the store unless asked; they read the
//! config and the manifest and, for `status`, walk the tree to count pending
//! changes without taking the sync lock.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::manifest::ManifestStore;
use crate::store::open_store;
use crate::sync;

#[derive(Serialize)]
struct ManifestEntry<'a> {
    path: &'a str,
    hash: &'a str,
}

/// Print configuration, manifest size, last sync time and pending changes.
pub fn run_status(config: &Config) -> Result<()> {
    let plan = sync::plan(config, false)?;
    let changes = &plan.changes;

    println!("rag-sync status");
    println!("===============");
    println!();
    println!("  Base dir:    {}", config.base_dir.display());
    println!("  Rag dir:     {}", config.rag_dir.display());
    println!(
        "  Store:       {:?} ({})",
        config.store.backend,
        config.store_path().display()
    );
    println!("  Included:    {}", config.included_paths.join(", "));
    println!(
        "  Extensions:  {}",
        config
            .extensions
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    );
    println!();
    println!("  Indexed:     {} files", plan.manifest.len());
    println!(
        "  Last sync:   {}",
        match plan.manifest.last_sync {
            Some(ts) => format_ago(ts, Utc::now()),
            None => "never".to_string(),
        }
    );
    println!();
    if changes.is_empty() {
        println!("  Up to date.");
    } else {
        println!(
            "  Pending:     {} added, {} modified, {} removed",
            changes.added.len(),
            changes.modified.len(),
            changes.removed.len()
        );
    }
    if !plan.snapshot.unreadable.is_empty() {
        println!("  Unreadable:  {}", plan.snapshot.unreadable.len());
    }
    println!();
    Ok(())
}

/// List indexed files: manifest entries, or what the store itself reports.
pub async fn run_files(config: &Config, from_store: bool, json: bool) -> Result<()> {
    if from_store {
        let store = open_store(config).await?;
        let files = store.list_files().await;
        store.close().await?;
        let files = files?;
        if json {
            println!("{}", serde_json::to_string_pretty(&files)?);
        } else {
            for f in &files {
                println!("{:>6}  {}", f.chunks, f.path);
            }
        }
        return Ok(());
    }

    let manifest = ManifestStore::new(config.manifest_path()).load();
    if json {
        let entries: Vec<ManifestEntry> = manifest
            .files
            .iter()
            .map(|(path, hash)| ManifestEntry { path, hash })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for (path, hash) in &manifest.files {
            let short = hash.strip_prefix("sha256:").unwrap_or(hash);
            println!("{}  {}", short.get(..12).unwrap_or(short), path);
        }
    }
    Ok(())
}

/// Rank chunks against `text` and print the top `limit`.
pub async fn run_query(config: &Config, text: &str, limit: usize, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let hits = store.query(text, limit).await;
    store.close().await?;
    let hits = hits?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        if hit.end_line > 0 {
            println!(
                "{}. [{:.2}] {}:{}-{}",
                i + 1,
                hit.score,
                hit.path,
                hit.start_line,
                hit.end_line
            );
        } else {
            println!("{}. [{:.2}] {}", i + 1, hit.score, hit.path);
        }
        println!("    {}", snippet(&hit.chunk_text, 200));
        println!();
    }
    Ok(())
}

/// First `max` characters of `text` on one line.
fn snippet(text: &str, max: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

/// "3 hours ago" for recent times, an absolute timestamp after a month.
fn format_ago(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(ts);
    let (n, unit) = if age < Duration::zero() || age >= Duration::days(30) {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    } else if age < Duration::minutes(1) {
        return "just now".to_string();
    } else if age < Duration::hours(1) {
        (age.num_minutes(), "min")
    } else if age < Duration::days(1) {
        (age.num_hours(), "hour")
    } else {
        (age.num_days(), "day")
    };
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}
