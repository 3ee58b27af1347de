//! Ingest progress reporting.
//!
//! `dx ingest` and `dx analyze` report which phase they are in and how many
//! issues have been embedded so far. Everything goes to **stderr** so stdout
//! stays parseable for scripts.

use std::io::Write;

use diag_harness_core::ingest::{IngestEvent, IngestProgress, NoProgress};

/// Human-friendly lines: `ingest  embedding  1,234 / 5,000 issues (24%)`.
pub struct StderrProgress;

impl IngestProgress for StderrProgress {
    fn report(&self, event: IngestEvent) {
        emit(&human_line(&event));
    }
}

/// Machine-readable progress: one JSON object per line.
pub struct JsonProgress;

impl IngestProgress for JsonProgress {
    fn report(&self, event: IngestEvent) {
        if let Ok(line) = serde_json::to_string(&json_event(&event)) {
            emit(&line);
        }
    }
}

fn emit(line: &str) {
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "{}", line);
    let _ = stderr.flush();
}

fn human_line(event: &IngestEvent) -> String {
    match event {
        IngestEvent::Parsing => "ingest  parsing report...".to_string(),
        IngestEvent::Embedding { n, total } => format!(
            "ingest  embedding  {} / {} issues ({}%)",
            group_thousands(*n),
            group_thousands(*total),
            percent(*n, *total)
        ),
    }
}

fn json_event(event: &IngestEvent) -> serde_json::Value {
    match event {
        IngestEvent::Parsing => serde_json::json!({
            "event": "progress",
            "phase": "parsing"
        }),
        IngestEvent::Embedding { n, total } => serde_json::json!({
            "event": "progress",
            "phase": "embedding",
            "n": n,
            "total": total
        }),
    }
}

fn percent(n: usize, total: usize) -> usize {
    if total == 0 {
        100
    } else {
        n.min(total) * 100 / total
    }
}

fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Where progress goes for one CLI invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a terminal, nothing otherwise.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgress> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
