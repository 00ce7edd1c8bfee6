//! Sync progress reporting.
//!
//! A first sync of a large tree can take minutes, so runs started by hand show
//! what they are doing: scanning, the size of the change-set, then each
//! applied change. Everything goes to **stderr**; stdout carries only the
//! final summary. Hook-triggered runs have no TTY and stay silent by default.

use serde::Serialize;
use std::fmt;
use std::io::Write;

/// A single progress event for sync.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum SyncProgressEvent {
    /// Walking and hashing candidate files. Total unknown.
    Scanning,
    /// Change-set computed.
    Planned { changes: u64, unchanged: u64 },
    /// `n` of `total` changes applied, successfully or not.
    Applying { n: u64, total: u64 },
}

impl fmt::Display for SyncProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncProgressEvent::Scanning => write!(f, "scanning..."),
            SyncProgressEvent::Planned { changes, unchanged } => write!(
                f,
                "{} to apply, {} unchanged",
                thousands(*changes),
                thousands(*unchanged)
            ),
            SyncProgressEvent::Applying { n, total } => {
                write!(f, "applying  {} / {}", thousands(*n), thousands(*total))
            }
        }
    }
}

/// Receives progress events from the orchestrator and ingestion adapter.
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// `rag-sync  applying  12 / 1,204` on stderr.
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "rag-sync  {}", event);
        let _ = err.flush();
    }
}

/// One JSON object per line on stderr, e.g.
/// `{"event":"progress","phase":"applying","n":3,"total":10}`.
pub struct JsonProgress;

#[derive(Serialize)]
struct JsonLine<'a> {
    event: &'static str,
    #[serde(flatten)]
    inner: &'a SyncProgressEvent,
}

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = JsonLine {
            event: "progress",
            inner: &event,
        };
        if let Ok(json) = serde_json::to_string(&line) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", json);
            let _ = err.flush();
        }
    }
}

pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

/// Decimal with `,` every three digits.
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.char_indices() {
        if i > 0 && (i + 3 - head) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human when stderr is a terminal, off otherwise.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
