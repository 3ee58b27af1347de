//! Line-oriented diagnostic parser.
//!
//! Turns captured analyzer output into [`Candidate`]s. The parser works on
//! already-captured text only, so it can be driven by literal strings in
//! tests as easily as by a process's stdout.
//!
//! # Canonical Shape
//!
//! ```text
//! <path>(<line>,<column>): <severity> <ruleId>: <message>
//! ```
//!
//! An optional `,<endLine>,<endColumn>` tail inside the parentheses is
//! tolerated, and the rule code may be missing (a unique code is generated).
//!
//! # Line Classification
//!
//! 1. A line matching the canonical shape starts a new candidate.
//! 2. A non-matching line that begins with whitespace, seen after at least
//!    one candidate, is a continuation: its trimmed text is appended to the
//!    previous candidate's message with a single space.
//! 3. Anything else (blank lines, banners, tool chatter) is discarded.
//!
//! A line that has the canonical shape but a non-integer line or column is
//! malformed: it is dropped and counted, the pass continues.
//!
//! # Example
//!
//! ```rust
//! use diag_harness_core::parse::parse_lines;
//!
//! let out = parse_lines([
//!     "Build started.",
//!     "src/Foo.cs(10,4): warning CA1001: missing disposal",
//!     "    of field 'stream'",
//! ]);
//! assert_eq!(out.len(), 1);
//! assert_eq!(out[0].message, "missing disposal of field 'stream'");
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::models::Candidate;

static DIAGNOSTIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?P<path>[^\s(][^(]*?)\s*\((?P<line>[^,()]*),(?P<col>[^,()]*)(?:,[^()]*)?\)\s*:\s*(?P<severity>[A-Za-z]+)(?:\s+(?P<rule>[^\s:]+))?\s*:\s*(?P<message>.*)$",
    )
    .expect("diagnostic pattern is valid")
});

/// Why a single line did not produce a candidate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("line does not have the diagnostic shape")]
    NoMatch,

    #[error("invalid {field} number '{value}'")]
    BadNumber { field: &'static str, value: String },
}

/// What the parser did with one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Matched,
    Continuation,
    Malformed,
    Discarded,
}

/// Per-pass counters, reported by the ingest command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub matched: usize,
    pub continuations: usize,
    pub malformed: usize,
    pub discarded: usize,
}

/// Parse a single line in the canonical diagnostic shape.
pub fn parse_line(line: &str) -> Result<Candidate, LineError> {
    let caps = DIAGNOSTIC_RE.captures(line).ok_or(LineError::NoMatch)?;

    let line_no = parse_number(&caps["line"], "line")?;
    let column = parse_number(&caps["col"], "column")?;

    Ok(Candidate::new(
        &caps["path"],
        line_no,
        column,
        &caps["severity"],
        caps.name("rule").map(|m| m.as_str()),
        &caps["message"],
    ))
}

fn parse_number(raw: &str, field: &'static str) -> Result<i64, LineError> {
    raw.trim().parse::<i64>().map_err(|_| LineError::BadNumber {
        field,
        value: raw.to_string(),
    })
}

/// Returns true when `line` starts with whitespace and has visible content.
fn is_indented(line: &str) -> bool {
    line.starts_with(char::is_whitespace) && !line.trim().is_empty()
}

/// Stateful single-pass parser.
///
/// Holds the candidates emitted so far so continuation lines can extend the
/// most recent one. Use [`parse_lines`] unless the caller needs to interleave
/// its own line handling (see [`crate::report::parse_sectioned`]).
#[derive(Debug, Default)]
pub struct DiagnosticParser {
    candidates: Vec<Candidate>,
    stats: ParseStats,
    /// Candidates before this index no longer accept continuation lines.
    barrier: usize,
}

impl DiagnosticParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify and consume one line.
    pub fn feed(&mut self, line: &str) -> LineOutcome {
        match parse_line(line) {
            Ok(candidate) => {
                self.candidates.push(candidate);
                self.stats.matched += 1;
                LineOutcome::Matched
            }
            Err(LineError::NoMatch) => {
                if is_indented(line) && self.candidates.len() > self.barrier {
                    if let Some(last) = self.candidates.last_mut() {
                        let extra = line.trim();
                        if last.message.is_empty() {
                            last.message = extra.to_string();
                        } else {
                            last.message.push(' ');
                            last.message.push_str(extra);
                        }
                        self.stats.continuations += 1;
                        return LineOutcome::Continuation;
                    }
                }
                self.stats.discarded += 1;
                LineOutcome::Discarded
            }
            Err(err) => {
                tracing::debug!("skipping malformed diagnostic line: {} ({:?})", err, line);
                self.stats.malformed += 1;
                LineOutcome::Malformed
            }
        }
    }

    /// Close every candidate seen so far to continuation lines.
    ///
    /// Called at a section boundary so indented text in the next section is
    /// never appended to a diagnostic from the previous file.
    pub fn start_section(&mut self) {
        self.barrier = self.candidates.len();
    }

    /// Append a candidate produced outside the canonical shape.
    ///
    /// Later continuation lines attach to it like any other candidate.
    pub fn push(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
        self.stats.matched += 1;
    }

    /// Replace the most recent `Discarded` outcome with `candidate`.
    pub(crate) fn adopt_discarded(&mut self, candidate: Candidate) {
        self.stats.discarded = self.stats.discarded.saturating_sub(1);
        self.push(candidate);
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    pub fn finish(self) -> (Vec<Candidate>, ParseStats) {
        (self.candidates, self.stats)
    }
}

/// Parse a sequence of lines into candidates, discarding stats.
pub fn parse_lines<I, S>(lines: I) -> Vec<Candidate>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parse_lines_with_stats(lines).0
}

/// Parse a sequence of lines into candidates and per-pass counters.
pub fn parse_lines_with_stats<I, S>(lines: I) -> (Vec<Candidate>, ParseStats)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = DiagnosticParser::new();
    for line in lines {
        parser.feed(line.as_ref());
    }
    parser.finish()
}
