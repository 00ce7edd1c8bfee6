//! # rag-sync
//!
//! Incremental synchronization of a project tree into a retrieval index.
//!
//! A run walks the configured paths, hashes every candidate file, compares
//! the hashes with the manifest written by the previous run and sends only
//! the difference to the store. Nothing but the manifest is kept between
//! runs, so the binary can be fired from editor or agent hooks after every
//! edit.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │  Walker  │──▶│   Diff   │──▶│  Ingest  │──▶│  Store   │
//! │ walk+hash│   │ vs. last │   │ chunk +  │   │ SQLite / │
//! └──────────┘   │ manifest │   │  submit  │   │   MCP    │
//!                └────▲─────┘   └────┬─────┘   └──────────┘
//!                     │              │
//!                ┌────┴──────────────▼─┐
//!                │ .sync_manifest.json │
//!                └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag-sync                       # sync ./rag/config.toml
//! rag-sync sync --dry-run        # show what would change
//! rag-sync query "deploy steps"  # ranked chunks from the index
//! rag-sync status
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | `config.toml` parsing and validation |
//! | [`walker`] | Candidate discovery and hashing |
//! | [`manifest`] | Manifest load/atomic save, content hashing |
//! | [`diff`] | Change-set computation |
//! | [`chunk`] | Line-window chunker |
//! | [`ingest`] | Applies a change-set to a store |
//! | [`store`] | `Store` trait and backends |
//! | [`sync`] | Run orchestration |
//! | [`lock`] | Cross-process sync lock |
//! | [`progress`] | stderr progress reporting |
//! | [`status`] | `status`, `files` and `query` commands |
//! | [`error`] | Error taxonomy |

pub mod chunk;
pub mod config;
pub mod diff;
pub mod error;
pub mod ingest;
pub mod lock;
pub mod manifest;
pub mod progress;
pub mod status;
pub mod store;
pub mod sync;
pub mod walker;
