//! Core data models used throughout Diagnostic Harness.
//!
//! A diagnostic travels through the pipeline as a [`Candidate`] (parsed but
//! not yet identified) and is stored as an [`IssueRecord`]. Reads from the
//! store that carry a similarity distance come back as [`RankedIssue`]s.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// File value used when a diagnostic carries no usable path.
pub const UNKNOWN_FILE: &str = "unknown";

/// Line/column value meaning "unknown or unavailable".
pub const UNKNOWN_POSITION: i64 = -1;

/// Severity token for anything outside the recognized set.
pub const UNKNOWN_SEVERITY: &str = "unknown";

/// Prefix of rule codes generated for diagnostics that omit one.
pub const GENERATED_RULE_PREFIX: &str = "auto-";

const KNOWN_SEVERITIES: &[&str] = &[
    "error",
    "warning",
    "info",
    "hidden",
    "note",
    "suggestion",
    "high",
    "medium",
    "low",
];

/// Normalize a raw severity string to a lowercase token.
///
/// Recognized tokens pass through lower-cased, a few common aliases are
/// folded (`err`, `warn`, `information`), and everything else becomes
/// [`UNKNOWN_SEVERITY`]. Never fails.
///
/// ```rust
/// use diag_harness_core::models::normalize_severity;
///
/// assert_eq!(normalize_severity("Warning"), "warning");
/// assert_eq!(normalize_severity("warn"), "warning");
/// assert_eq!(normalize_severity("catastrophic"), "unknown");
/// ```
pub fn normalize_severity(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let token = match lower.as_str() {
        "err" => "error",
        "warn" => "warning",
        "information" => "info",
        s if KNOWN_SEVERITIES.contains(&s) => s,
        _ => UNKNOWN_SEVERITY,
    };
    token.to_string()
}

/// Generate a process-local unique rule code for a diagnostic without one.
pub fn generated_rule_id() -> String {
    format!("{}{}", GENERATED_RULE_PREFIX, Uuid::new_v4())
}

/// A parsed diagnostic that has not yet been assigned an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub file: String,
    pub line: i64,
    pub column: i64,
    /// Normalized severity token.
    pub severity: String,
    pub rule_id: String,
    /// `true` when `rule_id` was generated because the source had none.
    pub rule_generated: bool,
    pub message: String,
}

impl Candidate {
    /// Build a candidate, applying the total defaults for every field.
    ///
    /// - an empty `file` becomes [`UNKNOWN_FILE`]
    /// - `severity` is normalized via [`normalize_severity`]
    /// - a missing or blank `rule_id` is replaced by [`generated_rule_id`]
    pub fn new(
        file: &str,
        line: i64,
        column: i64,
        severity: &str,
        rule_id: Option<&str>,
        message: &str,
    ) -> Self {
        let file = file.trim();
        let (rule_id, rule_generated) = match rule_id.map(str::trim) {
            Some(r) if !r.is_empty() => (r.to_string(), false),
            _ => (generated_rule_id(), true),
        };
        Self {
            file: if file.is_empty() {
                UNKNOWN_FILE.to_string()
            } else {
                file.to_string()
            },
            line,
            column,
            severity: normalize_severity(severity),
            rule_id,
            rule_generated,
            message: message.trim().to_string(),
        }
    }

    /// Reconstruct the canonical one-line diagnostic shape:
    /// `<path>(<line>,<column>): <severity> <ruleId>: <message>`.
    ///
    /// Generated rule codes are omitted, so the output re-parses to the
    /// same fields.
    pub fn to_canonical_line(&self) -> String {
        if self.rule_generated {
            format!(
                "{}({},{}): {}: {}",
                self.file, self.line, self.column, self.severity, self.message
            )
        } else {
            format!(
                "{}({},{}): {} {}: {}",
                self.file, self.line, self.column, self.severity, self.rule_id, self.message
            )
        }
    }

    /// Attach an identity, producing the storable record.
    pub fn into_record(self, identity: String) -> IssueRecord {
        IssueRecord {
            identity,
            file: self.file,
            line: self.line,
            column: self.column,
            severity: self.severity,
            rule_id: self.rule_id,
            rule_generated: self.rule_generated,
            message: self.message,
        }
    }
}

/// Normalized issue stored in an [`IssueStore`](crate::store::IssueStore).
///
/// Immutable once stored; corrections happen by clearing the collection and
/// re-ingesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    /// Composite dedup key, see [`crate::dedup::identity`].
    pub identity: String,
    pub file: String,
    pub line: i64,
    pub column: i64,
    pub severity: String,
    pub rule_id: String,
    #[serde(default)]
    pub rule_generated: bool,
    pub message: String,
}

impl IssueRecord {
    /// Deterministic, lower-cased text that gets embedded for this record.
    ///
    /// Field order is fixed (rule, file, line, severity, message) so that
    /// identical records always produce identical vectors.
    pub fn canonical_text(&self) -> String {
        format!(
            "code analysis issue with id {}. it occurs in the file {} on line {}. \
             the severity of the issue is {}. the message describing the issue is: {}.",
            self.rule_id, self.file, self.line, self.severity, self.message
        )
        .to_lowercase()
    }
}

/// An issue returned from a store read, with its distance to a probe vector
/// when the read was a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedIssue {
    #[serde(flatten)]
    pub issue: IssueRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl RankedIssue {
    pub fn unranked(issue: IssueRecord) -> Self {
        Self {
            issue,
            distance: None,
        }
    }

    /// Total order on distance: nearest first, NaN after every number,
    /// missing distances last.
    pub fn cmp_distance(&self, other: &Self) -> Ordering {
        match (self.distance, other.distance) {
            (Some(a), Some(b)) => sort_key(a).total_cmp(&sort_key(b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

fn sort_key(distance: f64) -> f64 {
    if distance.is_nan() {
        f64::INFINITY
    } else {
        distance
    }
}
