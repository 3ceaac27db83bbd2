//! Ingest progress reporting.
//!
//! Reports observable progress during `wctx ingest` so users see which
//! phase is running and how much is left. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::{IsTerminal, Write};

/// Phase of the ingest pipeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IngestPhase {
    /// Walking the node tree. Total unknown.
    Walking,
    /// Downloading node content into the staging directory.
    Fetching,
    /// Reading staged files into corpus documents.
    Loading,
    /// Embedding chunk batches.
    Embedding,
}

impl IngestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestPhase::Walking => "walking",
            IngestPhase::Fetching => "fetching",
            IngestPhase::Loading => "loading",
            IngestPhase::Embedding => "embedding",
        }
    }

    fn unit(&self) -> &'static str {
        match self {
            IngestPhase::Walking | IngestPhase::Fetching => "nodes",
            IngestPhase::Loading => "files",
            IngestPhase::Embedding => "chunks",
        }
    }
}

/// Reports ingest progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// `n` items done in `phase`, out of `total` when known.
    fn report(&self, phase: IngestPhase, n: u64, total: Option<u64>);
}

/// Human-friendly progress on stderr: "ingest  fetching  12 / 40 nodes".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, phase: IngestPhase, n: u64, total: Option<u64>) {
        let line = match total {
            Some(total) => format!(
                "ingest  {}  {} / {} {}\n",
                phase.as_str(),
                format_number(n),
                format_number(total),
                phase.unit()
            ),
            None => format!(
                "ingest  {}  {} {}...\n",
                phase.as_str(),
                format_number(n),
                phase.unit()
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, phase: IngestPhase, n: u64, total: Option<u64>) {
        let obj = serde_json::json!({
            "event": "progress",
            "phase": phase.as_str(),
            "n": n,
            "total": total,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _phase: IngestPhase, _n: u64, _total: Option<u64>) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if std::io::stderr().is_terminal() {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
