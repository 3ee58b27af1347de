//! Hybrid query engine.
//!
//! A free-text query is first checked against an ordered table of intent
//! rules. The first rule whose predicate matches answers the query
//! deterministically from the full issue set. When no rule matches, the
//! query is embedded and answered by nearest-neighbor search.
//!
//! # Rule Order
//!
//! | # | Intent | Trigger (on trimmed, lower-cased text) | Answer |
//! |---|--------|----------------------------------------|--------|
//! | 1 | `FileAttribution` | contains "which file", or the word "agent" | sorted distinct files |
//! | 2 | `AllIssues` | equals "all", "show all issues", "list issues" | every record |
//! | 3 | `Count` | contains "how many" or "count", or equals "total" | total count |
//! | 4 | `Categories` | contains "categories" or "types" | rule code → count |
//! | 5 | `Severity` | contains "high severity", "errors", "error" | error/high records |
//! | 6 | `TopFiles` | contains "most issues", "file with most", "file with high" | top-k files by count |
//!
//! Earlier rules win, so "how many errors" is a count, not a severity filter.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use anyhow::Result;
use serde::Serialize;

use crate::embedding::{embed_query, Embedder};
use crate::models::{IssueRecord, RankedIssue};
use crate::store::IssueStore;

/// What a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    FileAttribution,
    AllIssues,
    Count,
    Categories,
    Severity,
    TopFiles,
    /// No rule matched; answered by similarity search.
    Semantic,
}

type Predicate = fn(&str) -> bool;

const RULES: &[(Intent, Predicate)] = &[
    (Intent::FileAttribution, asks_file_attribution),
    (Intent::AllIssues, asks_all_issues),
    (Intent::Count, asks_count),
    (Intent::Categories, asks_categories),
    (Intent::Severity, asks_severity),
    (Intent::TopFiles, asks_top_files),
];

fn asks_file_attribution(q: &str) -> bool {
    q.contains("which file") || has_word(q, "agent")
}

fn asks_all_issues(q: &str) -> bool {
    matches!(q, "all" | "show all issues" | "list issues")
}

fn asks_count(q: &str) -> bool {
    q.contains("how many") || q.contains("count") || q == "total"
}

fn asks_categories(q: &str) -> bool {
    q.contains("categories") || q.contains("types")
}

fn asks_severity(q: &str) -> bool {
    q.contains("high severity") || q.contains("errors") || q.contains("error")
}

fn asks_top_files(q: &str) -> bool {
    q.contains("most issues") || q.contains("file with most") || q.contains("file with high")
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric()).any(|t| t == word)
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Classify a query. First matching rule wins; never fails.
///
/// ```rust
/// use diag_harness_core::query::{classify, Intent};
///
/// assert_eq!(classify("How many issues?"), Intent::Count);
/// assert_eq!(classify("null reference in parser"), Intent::Semantic);
/// ```
pub fn classify(text: &str) -> Intent {
    let q = normalize(text);
    RULES
        .iter()
        .find(|(_, matches)| matches(&q))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::Semantic)
}

/// Aggregate answers produced by rule dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Summary {
    Files(Vec<String>),
    Total(usize),
    Categories(BTreeMap<String, usize>),
    FileCount { file: String, count: usize },
    NoIssues,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Summary::Files(files) => write!(f, "Files with issues: {}", files.join(", ")),
            Summary::Total(n) => write!(f, "Total issues: {}", n),
            Summary::Categories(counts) => {
                let parts: Vec<String> = counts
                    .iter()
                    .map(|(rule, n)| format!("{}: {}", rule, n))
                    .collect();
                write!(f, "Issue categories: {}", parts.join(", "))
            }
            Summary::FileCount { file, count } => write!(f, "{}: {} issues", file, count),
            Summary::NoIssues => write!(f, "No issues found."),
        }
    }
}

/// One element of a query answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryResult {
    Issue(RankedIssue),
    Summary(Summary),
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryResult::Summary(summary) => summary.fmt(f),
            QueryResult::Issue(ranked) => {
                let issue = &ranked.issue;
                write!(
                    f,
                    "{}({},{}): {} {}: {}",
                    issue.file, issue.line, issue.column, issue.severity, issue.rule_id, issue.message
                )?;
                if let Some(d) = ranked.distance {
                    write!(f, "  [distance {:.4}]", d)?;
                }
                Ok(())
            }
        }
    }
}

/// Whether the store could answer at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutcome {
    Ready,
    /// The collection does not exist yet; nothing has been ingested.
    NotReady,
}

/// Full answer to one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub query: String,
    pub intent: Intent,
    pub outcome: QueryOutcome,
    pub results: Vec<QueryResult>,
}

/// Answer `text` against `store`.
///
/// `embedder` must be the one used at ingestion time; it is only called on
/// the semantic path. `top_k` bounds semantic hits and `TopFiles` entries.
pub async fn query<S, E>(store: &S, embedder: &E, text: &str, top_k: usize) -> Result<QueryResponse>
where
    S: IssueStore + ?Sized,
    E: Embedder + ?Sized,
{
    let q = normalize(text);
    let intent = classify(&q);
    let mut response = QueryResponse {
        query: q.clone(),
        intent,
        outcome: QueryOutcome::Ready,
        results: Vec::new(),
    };

    if !store.exists().await? {
        tracing::debug!("collection '{}' missing, query not ready", store.collection());
        response.outcome = QueryOutcome::NotReady;
        return Ok(response);
    }
    if q.is_empty() {
        return Ok(response);
    }

    tracing::debug!("query '{}' classified as {:?}", q, intent);
    response.results = match intent {
        Intent::Semantic => semantic(store, embedder, &q, top_k).await?,
        rule => answer_rule(rule, store.get_all().await?, top_k),
    };
    Ok(response)
}

async fn semantic<S, E>(store: &S, embedder: &E, q: &str, top_k: usize) -> Result<Vec<QueryResult>>
where
    S: IssueStore + ?Sized,
    E: Embedder + ?Sized,
{
    if top_k == 0 || store.count().await? == 0 {
        return Ok(Vec::new());
    }
    let vector = embed_query(embedder, q).await?;
    let mut hits = store.nearest(&vector, top_k).await?;
    hits.sort_by(RankedIssue::cmp_distance);
    Ok(hits.into_iter().map(QueryResult::Issue).collect())
}

/// Answer a rule intent from the full issue set.
fn answer_rule(intent: Intent, issues: Vec<IssueRecord>, top_k: usize) -> Vec<QueryResult> {
    if intent == Intent::Count {
        return vec![QueryResult::Summary(Summary::Total(issues.len()))];
    }
    if issues.is_empty() {
        return vec![QueryResult::Summary(Summary::NoIssues)];
    }

    let results: Vec<QueryResult> = match intent {
        Intent::FileAttribution => {
            let mut files: Vec<String> = issues.into_iter().map(|i| i.file).collect();
            files.sort();
            files.dedup();
            vec![QueryResult::Summary(Summary::Files(files))]
        }
        Intent::AllIssues => issues
            .into_iter()
            .map(|i| QueryResult::Issue(RankedIssue::unranked(i)))
            .collect(),
        Intent::Categories => {
            let mut counts = BTreeMap::new();
            for issue in &issues {
                *counts.entry(issue.rule_id.clone()).or_insert(0) += 1;
            }
            vec![QueryResult::Summary(Summary::Categories(counts))]
        }
        Intent::Severity => issues
            .into_iter()
            .filter(|i| i.severity == "error" || i.severity == "high")
            .map(|i| QueryResult::Issue(RankedIssue::unranked(i)))
            .collect(),
        Intent::TopFiles => top_files(&issues, top_k)
            .into_iter()
            .map(|(file, count)| QueryResult::Summary(Summary::FileCount { file, count }))
            .collect(),
        Intent::Count | Intent::Semantic => Vec::new(),
    };

    if results.is_empty() {
        vec![QueryResult::Summary(Summary::NoIssues)]
    } else {
        results
    }
}

/// Files by descending issue count; equal counts keep first-seen order.
fn top_files(issues: &[IssueRecord], k: usize) -> Vec<(String, usize)> {
    let mut order: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for issue in issues {
        match index.get(issue.file.as_str()) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(issue.file.as_str(), order.len());
                order.push((issue.file.clone(), 1));
            }
        }
    }
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order.truncate(k);
    order
}

/// Every stored issue in insertion order (the reporting view).
pub async fn all_issues<S: IssueStore + ?Sized>(store: &S) -> Result<Vec<IssueRecord>> {
    store.get_all().await
}
