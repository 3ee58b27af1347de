//! Report shape detection and canonicalization.
//!
//! Analyzer output reaches the pipeline in one of three shapes:
//!
//! | Format | Shape |
//! |--------|-------|
//! | `text` | raw analyzer output, one diagnostic per line (see [`crate::parse`]) |
//! | `sectioned` | per-file blocks introduced by `=== <path> ===` header lines |
//! | `json` | an array of objects with loosely named keys |
//!
//! Every shape is bridged into [`Candidate`] here so the rest of the
//! pipeline sees a single record type.

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::{Candidate, UNKNOWN_POSITION, UNKNOWN_SEVERITY};
use crate::parse::{DiagnosticParser, LineOutcome, ParseStats};

const FILE_KEYS: &[&str] = &["file", "path", "filePath", "file_path", "uri"];
const LINE_KEYS: &[&str] = &["line", "startLine", "start_line", "lineNumber"];
const COLUMN_KEYS: &[&str] = &["column", "col", "startColumn", "start_column"];
const SEVERITY_KEYS: &[&str] = &["severity", "level", "kind"];
const RULE_KEYS: &[&str] = &["ruleId", "rule_id", "rule", "code", "diagnosticId", "id"];
const MESSAGE_KEYS: &[&str] = &["message", "issue", "text", "description"];

/// Input report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Pick a format from the content, see [`detect_format`].
    #[default]
    Auto,
    Text,
    Sectioned,
    Json,
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "text" => Ok(Self::Text),
            "sectioned" => Ok(Self::Sectioned),
            "json" => Ok(Self::Json),
            other => bail!(
                "Unknown report format: '{}'. Use auto, text, sectioned, or json.",
                other
            ),
        }
    }
}

/// Returns the section path if `line` is a `=== <path> ===` header.
pub fn section_header(line: &str) -> Option<&str> {
    let t = line.trim();
    if t.len() > 6 && t.starts_with("===") && t.ends_with("===") {
        let inner = t.trim_matches('=').trim();
        if !inner.is_empty() {
            return Some(inner);
        }
    }
    None
}

/// Guess the format of a fully buffered report.
///
/// JSON only when the buffered text parses as a JSON array, plain text
/// otherwise. Sectioned reports are never guessed; callers that produce
/// `=== <path> ===` sections ask for [`ReportFormat::Sectioned`].
pub fn detect_format<S: AsRef<str>>(lines: &[S]) -> ReportFormat {
    if json_array(lines).is_some() {
        ReportFormat::Json
    } else {
        ReportFormat::Text
    }
}

/// The buffered report as a JSON array, if that is what it is.
fn json_array<S: AsRef<str>>(lines: &[S]) -> Option<Value> {
    let first_visible = lines
        .iter()
        .map(|l| l.as_ref().trim_start())
        .find(|l| !l.is_empty())?;
    if !first_visible.starts_with('[') {
        return None;
    }

    let text = lines
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join("\n");
    match serde_json::from_str::<Value>(&text) {
        Ok(value) if value.is_array() => Some(value),
        _ => None,
    }
}

/// Parse a sectioned report.
///
/// Canonical diagnostics and continuation lines behave exactly as in
/// [`crate::parse`]. Any other visible line inside a section becomes a
/// candidate attributed to the section's file with unknown position,
/// severity, and rule.
pub fn parse_sectioned<I, S>(lines: I) -> (Vec<Candidate>, ParseStats)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = DiagnosticParser::new();
    let mut section: Option<String> = None;

    for line in lines {
        let line = line.as_ref();
        if let Some(path) = section_header(line) {
            section = Some(path.to_string());
            parser.start_section();
            continue;
        }
        if parser.feed(line) != LineOutcome::Discarded {
            continue;
        }
        if let Some(file) = section.as_deref() {
            let text = line.trim();
            if !text.is_empty() {
                parser.adopt_discarded(Candidate::new(
                    file,
                    UNKNOWN_POSITION,
                    UNKNOWN_POSITION,
                    UNKNOWN_SEVERITY,
                    None,
                    text,
                ));
            }
        }
    }

    parser.finish()
}

/// Bridge a JSON report into candidates.
///
/// The root must be an array. Object elements are mapped through the key
/// alias lists; non-object elements are skipped and counted as discarded.
pub fn canonicalize_json(value: &Value) -> Result<(Vec<Candidate>, ParseStats)> {
    let items = match value.as_array() {
        Some(items) => items,
        None => bail!("JSON report must be an array of diagnostics"),
    };

    let mut stats = ParseStats::default();
    let mut out = Vec::with_capacity(items.len());

    for item in items {
        match item.as_object() {
            Some(obj) => {
                out.push(canonicalize_object(obj));
                stats.matched += 1;
            }
            None => stats.discarded += 1,
        }
    }

    Ok((out, stats))
}

fn canonicalize_object(obj: &Map<String, Value>) -> Candidate {
    let file = lookup_str(obj, FILE_KEYS).unwrap_or_default();
    let line = lookup_int(obj, LINE_KEYS).unwrap_or(UNKNOWN_POSITION);
    let column = lookup_int(obj, COLUMN_KEYS).unwrap_or(UNKNOWN_POSITION);
    let severity = lookup_str(obj, SEVERITY_KEYS).unwrap_or_default();
    let rule = lookup_str(obj, RULE_KEYS);
    let message = lookup_str(obj, MESSAGE_KEYS).unwrap_or_default();

    Candidate::new(&file, line, column, &severity, rule.as_deref(), &message)
}

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn lookup_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match lookup(obj, keys)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lookup_int(obj: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    match lookup(obj, keys)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a report of the given format into candidates.
///
/// `Text` and `Sectioned` stream the lines once; `Json` and `Auto` buffer
/// them first. `Auto` falls back to text when the buffer is not a JSON array.
pub fn parse_report<I, S>(lines: I, format: ReportFormat) -> Result<(Vec<Candidate>, ParseStats)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    match format {
        ReportFormat::Text => Ok(crate::parse::parse_lines_with_stats(lines)),
        ReportFormat::Sectioned => Ok(parse_sectioned(lines)),
        ReportFormat::Json => {
            let buffered: Vec<String> = lines.into_iter().map(|l| l.as_ref().to_string()).collect();
            parse_json_lines(&buffered)
        }
        ReportFormat::Auto => {
            let buffered: Vec<String> = lines.into_iter().map(|l| l.as_ref().to_string()).collect();
            match json_array(&buffered) {
                Some(value) => {
                    tracing::debug!("detected JSON report");
                    canonicalize_json(&value)
                }
                None => Ok(crate::parse::parse_lines_with_stats(&buffered)),
            }
        }
    }
}

fn parse_json_lines(lines: &[String]) -> Result<(Vec<Candidate>, ParseStats)> {
    let text = lines.join("\n");
    if text.trim().is_empty() {
        return Ok((Vec::new(), ParseStats::default()));
    }
    let value: Value = serde_json::from_str(&text).context("Failed to parse JSON report")?;
    canonicalize_json(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_detection() {
        assert_eq!(section_header("=== src/Foo.cs ==="), Some("src/Foo.cs"));
        assert_eq!(section_header("  ===  a.cs  ===  "), Some("a.cs"));
        assert_eq!(section_header("======"), None);
        assert_eq!(section_header("a.cs(1,1): error X: y"), None);
    }

    #[test]
    fn detects_formats() {
        assert_eq!(detect_format(&["", "  [ {\"file\": \"a\"} ]"]), ReportFormat::Json);
        assert_eq!(detect_format(&["=== a.cs ===", "x"]), ReportFormat::Text);
        assert_eq!(detect_format(&["[INFO] starting"]), ReportFormat::Text);
        assert_eq!(detect_format(&["[1, 2"]), ReportFormat::Text);
        assert_eq!(detect_format(&["a.cs(1,1): error X: y"]), ReportFormat::Text);
        let empty: [&str; 0] = [];
        assert_eq!(detect_format(&empty), ReportFormat::Text);
    }

    #[test]
    fn sectioned_attributes_plain_lines_to_section() {
        let (out, stats) = parse_sectioned([
            "=== /repo/src/Foo.cs ===",
            "Analyzing code",
            "  Foo.cs(3,1): warning RCS1001: Add braces",
            "",
            "=== /repo/src/Bar.cs ===",
            "Bar has a problem",
        ]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].file, "/repo/src/Foo.cs");
        assert_eq!(out[0].line, -1);
        assert_eq!(out[0].severity, "unknown");
        assert!(out[0].rule_generated);
        assert_eq!(out[1].file, "Foo.cs");
        assert_eq!(out[1].rule_id, "RCS1001");
        assert_eq!(out[2].file, "/repo/src/Bar.cs");
        assert_eq!(out[2].message, "Bar has a problem");
        assert_eq!(stats.matched, 3);
        assert_eq!(stats.discarded, 1);
    }

    #[test]
    fn sectioned_continuations_still_join() {
        let (out, _) = parse_sectioned([
            "=== a.cs ===",
            "a.cs(1,1): error E1: first",
            "    more detail",
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message, "first more detail");
    }

    #[test]
    fn json_aliases_are_bridged() {
        let value = json!([
            {"file": "a.cs", "issue": "legacy shape"},
            {"path": "b.cs", "startLine": "7", "col": 2, "level": "Error", "code": "CS0001", "text": "bad"},
            {"file": "c.cs", "id": "W9", "severity": "warning", "message": "m", "line": 3, "column": null},
            "not an object",
        ]);
        let (out, stats) = canonicalize_json(&value).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(stats.discarded, 1);

        assert_eq!(out[0].file, "a.cs");
        assert_eq!(out[0].line, -1);
        assert_eq!(out[0].severity, "unknown");
        assert!(out[0].rule_generated);
        assert_eq!(out[0].message, "legacy shape");

        assert_eq!(out[1].file, "b.cs");
        assert_eq!(out[1].line, 7);
        assert_eq!(out[1].column, 2);
        assert_eq!(out[1].severity, "error");
        assert_eq!(out[1].rule_id, "CS0001");

        assert_eq!(out[2].rule_id, "W9");
        assert_eq!(out[2].column, -1);
    }

    #[test]
    fn json_root_must_be_array() {
        assert!(canonicalize_json(&json!({"file": "a"})).is_err());
    }

    #[test]
    fn auto_dispatches_on_content() {
        let (out, _) = parse_report(
            ["[", r#"{"file": "x.cs", "message": "m", "ruleId": "R1"}"#, "]"],
            ReportFormat::Auto,
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rule_id, "R1");

        let (out, _) = parse_report(["x.cs(1,1): info I: hi"], ReportFormat::Auto).unwrap();
        assert_eq!(out[0].severity, "info");
    }

    #[test]
    fn auto_treats_bracketed_banner_as_text() {
        let lines = [
            "[12:00:01] Analyzing 'App.csproj'",
            "src/Foo.cs(10,4): warning CA1001: missing disposal",
        ];
        let (out, stats) = parse_report(lines, ReportFormat::Auto).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rule_id, "CA1001");
        assert_eq!(stats.discarded, 1);

        let (out, _) = parse_report(["[INFO] no diagnostics"], ReportFormat::Auto).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn auto_ignores_header_banners_in_plain_output() {
        let (out, _) = parse_report(
            [
                "=== Build ===",
                "Build succeeded.",
                "src/Foo.cs(10,4): warning CA1001: missing disposal",
            ],
            ReportFormat::Auto,
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].file, "src/Foo.cs");
    }

    #[test]
    fn explicit_json_still_reports_syntax_errors() {
        assert!(parse_report(["[12:00:01] x"], ReportFormat::Json).is_err());
    }

    #[test]
    fn section_header_stops_continuations_from_previous_file() {
        let (out, stats) = parse_sectioned([
            "=== /repo/A.cs ===",
            "A.cs(1,1): warning W1: first",
            "=== /repo/B.cs ===",
            "    B-only note",
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].message, "first");
        assert_eq!(out[1].file, "/repo/B.cs");
        assert_eq!(out[1].message, "B-only note");
        assert_eq!(stats.continuations, 0);
    }

    #[test]
    fn format_from_str() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!("yaml".parse::<ReportFormat>().is_err());
    }
}
