//! # rag-sync CLI
//!
//! Keeps a retrieval index in step with a project tree. Meant to be run
//! from editor or agent hooks after every edit: a run with nothing to do
//! prints nothing and exits 0.
//!
//! ## Usage
//!
//! ```bash
//! rag-sync [--rag-dir ./rag] [-v] [--progress off|human|json] [<command>]
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag-sync` / `rag-sync sync` | Sync changed files into the index |
//! | `rag-sync query "<text>"` | Ranked chunks from the index |
//! | `rag-sync files` | Files recorded in the manifest |
//! | `rag-sync status` | Config, last sync and pending changes |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use rag_sync::config;
use rag_sync::diff::ChangeSet;
use rag_sync::progress::ProgressMode;
use rag_sync::status;
use rag_sync::sync::{self, SyncOptions, SyncReport};

/// Incremental sync of a project tree into a RAG index.
#[derive(Parser)]
#[command(
    name = "rag-sync",
    about = "Incrementally sync a project tree into a retrieval index",
    version
)]
struct Cli {
    /// Directory holding config.toml, the manifest and the default store.
    #[arg(long, global = true, env = "RAG_SYNC_DIR", default_value = "./rag")]
    rag_dir: PathBuf,

    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Progress on stderr. Defaults to human on a TTY, off otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync changed files into the index (the default).
    Sync {
        /// Re-ingest every candidate file.
        #[arg(long)]
        full: bool,

        /// Print the change-set without touching the store or manifest.
        #[arg(long)]
        dry_run: bool,
    },

    /// Query the index.
    Query {
        /// Free text to rank chunks against.
        text: String,

        /// Maximum number of hits.
        #[arg(long, short = 'k', default_value_t = 10)]
        limit: usize,

        /// Print hits as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List indexed files.
    Files {
        /// Ask the store instead of reading the manifest.
        #[arg(long)]
        store: bool,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show configuration, last sync and pending changes.
    Status,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    let command = cli.command.unwrap_or(Commands::Sync {
        full: false,
        dry_run: false,
    });

    match command {
        Commands::Sync { full, dry_run } => {
            let options = SyncOptions { full, dry_run };
            let report = sync::run_sync(&cli.rag_dir, options, progress.as_ref()).await?;
            print_report(&report);
        }
        Commands::Query { text, limit, json } => {
            let cfg = config::load_config(&cli.rag_dir)?;
            status::run_query(&cfg, &text, limit, json).await?;
        }
        Commands::Files { store, json } => {
            let cfg = config::load_config(&cli.rag_dir)?;
            status::run_files(&cfg, store, json).await?;
        }
        Commands::Status => {
            let cfg = config::load_config(&cli.rag_dir)?;
            status::run_status(&cfg)?;
        }
    }

    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.noop {
        return;
    }
    if report.dry_run {
        print_changes(&report.changes);
        return;
    }
    if report.failed() == 0 {
        println!(
            "Sync complete: {} updated, {} removed.",
            report.updated, report.removed
        );
    } else {
        eprintln!(
            "Sync: {} updated, {} removed, {} failed (see stderr).",
            report.updated,
            report.removed,
            report.failed()
        );
    }
}

fn print_changes(changes: &ChangeSet) {
    for c in &changes.added {
        println!("A  {}", c.path);
    }
    for c in &changes.modified {
        println!("M  {}", c.path);
    }
    for path in &changes.removed {
        println!("D  {}", path);
    }
    println!(
        "Dry run: {} added, {} modified, {} removed, {} unchanged.",
        changes.added.len(),
        changes.modified.len(),
        changes.removed.len(),
        changes.unchanged
    );
}
