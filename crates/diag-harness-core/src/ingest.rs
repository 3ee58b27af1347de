//! Ingestion pipeline: parse → identify → admit → embed → store.
//!
//! One call of [`ingest`] handles one analysis run. Existing identities are
//! loaded from the store once up front, admitted records are embedded in
//! batches of [`IngestOptions::batch_size`] (one backend call per batch), and
//! each batch is written with [`IssueStore::put_batch`].
//!
//! An embedding failure aborts the run with that error. Records written by
//! earlier batches stay stored; re-running the same input is safe because
//! known identities are skipped.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::dedup::{Deduplicator, PathResolver};
use crate::embedding::Embedder;
use crate::models::IssueRecord;
use crate::report::{parse_report, ReportFormat};
use crate::store::IssueStore;

/// Default number of texts per embedding call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Options for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Root that relative path hints are resolved against.
    pub repo_root: String,
    /// Drop the whole collection before ingesting.
    pub clear_existing: bool,
    pub format: ReportFormat,
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            repo_root: String::new(),
            clear_existing: false,
            format: ReportFormat::Auto,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Counters for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Candidates produced by the parser.
    pub parsed: usize,
    /// Candidates whose identity was new.
    pub admitted: usize,
    /// Candidates dropped because the identity was already known.
    pub skipped_duplicates: usize,
    /// Records actually written to the store.
    pub inserted: usize,
    /// Lines with the diagnostic shape but unreadable numbers.
    pub malformed: usize,
}

/// Progress event emitted while ingesting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    /// Reading and parsing the report. Total unknown.
    Parsing,
    /// `n` of `total` admitted records embedded and stored.
    Embedding { n: usize, total: usize },
}

/// Receives [`IngestEvent`]s. The app crate writes them to stderr.
pub trait IngestProgress: Send + Sync {
    fn report(&self, event: IngestEvent);
}

/// Reporter that ignores every event.
pub struct NoProgress;

impl IngestProgress for NoProgress {
    fn report(&self, _event: IngestEvent) {}
}

/// Run one ingestion pass over `lines`.
pub async fn ingest<S, E, I, L>(
    store: &S,
    embedder: &E,
    resolver: &dyn PathResolver,
    lines: I,
    options: &IngestOptions,
    progress: &dyn IngestProgress,
) -> Result<IngestReport>
where
    S: IssueStore + ?Sized,
    E: Embedder + ?Sized,
    I: IntoIterator<Item = L>,
    L: AsRef<str>,
{
    if options.batch_size == 0 {
        bail!("ingest batch_size must be >= 1");
    }

    progress.report(IngestEvent::Parsing);
    let (candidates, stats) = parse_report(lines, options.format)?;

    let mut report = IngestReport {
        parsed: candidates.len(),
        malformed: stats.malformed,
        ..Default::default()
    };

    if options.clear_existing {
        tracing::info!("clearing collection '{}' before ingest", store.collection());
        store.delete_all().await?;
    }

    if candidates.is_empty() {
        tracing::info!("nothing to ingest");
        return Ok(report);
    }

    let existing = store.identities().await?;
    let mut dedup = Deduplicator::new(resolver, &options.repo_root, existing);
    let admitted: Vec<IssueRecord> = candidates
        .into_iter()
        .filter_map(|c| dedup.admit(c))
        .collect();

    report.admitted = admitted.len();
    report.skipped_duplicates = report.parsed - report.admitted;
    tracing::debug!(
        "parsed {} candidates, admitted {}, skipped {}",
        report.parsed,
        report.admitted,
        report.skipped_duplicates
    );

    let total = admitted.len();
    let mut done = 0;
    for batch in admitted.chunks(options.batch_size) {
        let texts: Vec<String> = batch.iter().map(IssueRecord::canonical_text).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != batch.len() {
            bail!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            );
        }
        report.inserted += store.put_batch(batch, &vectors).await?;
        done += batch.len();
        progress.report(IngestEvent::Embedding { n: done, total });
    }

    tracing::info!(
        "ingested {} new issues into '{}'",
        report.inserted,
        store.collection()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::dedup::LexicalResolver;
    use crate::embedding::HashEmbedder;
    use crate::store::memory::InMemoryStore;

    const REPORT: &[&str] = &[
        "Analyzing project...",
        "src/A.cs(1,1): warning RCS1001: Add braces",
        "src/B.cs(4,2): error CS0103: Name does not exist",
        "    in this context",
        "src/B.cs(x,2): error CS0103: bad number",
    ];

    /// Embedder that counts calls and can be told to fail.
    struct CountingEmbedder {
        inner: HashEmbedder,
        calls: Mutex<usize>,
        fail: bool,
    }

    impl CountingEmbedder {
        fn new(fail: bool) -> Self {
            Self {
                inner: HashEmbedder::new(32),
                calls: Mutex::new(0),
                fail,
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }

        fn dims(&self) -> usize {
            self.inner.dims()
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                bail!("backend down");
            }
            self.inner.embed(texts).await
        }
    }

    fn opts() -> IngestOptions {
        IngestOptions {
            repo_root: "/repo".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn ingests_and_reports_counts() {
        let store = InMemoryStore::new("issues");
        let embedder = CountingEmbedder::new(false);
        let report = ingest(&store, &embedder, &LexicalResolver, REPORT, &opts(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(report.parsed, 2);
        assert_eq!(report.admitted, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.malformed, 1);
        assert_eq!(embedder.calls(), 1);

        let all = store.get_all().await.unwrap();
        assert_eq!(all[1].message, "Name does not exist in this context");
    }

    #[tokio::test]
    async fn same_input_twice_is_idempotent() {
        let store = InMemoryStore::new("issues");
        let embedder = HashEmbedder::new(32);
        let line = ["src/Foo.cs(10,4): warning CA1001: missing disposal"];

        let first = ingest(&store, &embedder, &LexicalResolver, line, &opts(), &NoProgress)
            .await
            .unwrap();
        let second = ingest(&store, &embedder, &LexicalResolver, line, &opts(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(first.inserted, 1);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_duplicates, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn in_batch_repeats_are_stored_once() {
        let store = InMemoryStore::new("issues");
        let embedder = HashEmbedder::new(32);
        let lines = [
            "src/Foo.cs(10,4): warning CA1001: missing disposal",
            "/repo/src/Foo.cs(10,9): warning CA1001: missing disposal again",
        ];
        let report = ingest(&store, &embedder, &LexicalResolver, lines, &opts(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped_duplicates, 1);
    }

    #[tokio::test]
    async fn empty_input_makes_no_embedding_call() {
        let store = InMemoryStore::new("issues");
        let embedder = CountingEmbedder::new(false);
        let report = ingest(
            &store,
            &embedder,
            &LexicalResolver,
            ["", "Build succeeded."],
            &opts(),
            &NoProgress,
        )
        .await
        .unwrap();
        assert_eq!(report.inserted, 0);
        assert_eq!(embedder.calls(), 0);
        assert!(!store.exists().await.unwrap());
    }

    #[tokio::test]
    async fn clear_existing_replaces_collection() {
        let store = InMemoryStore::new("issues");
        let embedder = HashEmbedder::new(32);
        ingest(&store, &embedder, &LexicalResolver, REPORT, &opts(), &NoProgress)
            .await
            .unwrap();

        let options = IngestOptions {
            clear_existing: true,
            ..opts()
        };
        let report = ingest(
            &store,
            &embedder,
            &LexicalResolver,
            ["src/A.cs(1,1): warning RCS1001: Add braces"],
            &options,
            &NoProgress,
        )
        .await
        .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn embedding_failure_propagates() {
        let store = InMemoryStore::new("issues");
        let embedder = CountingEmbedder::new(true);
        let err = ingest(&store, &embedder, &LexicalResolver, REPORT, &opts(), &NoProgress)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("backend down"));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batches_follow_batch_size_and_report_progress() {
        struct Recorder(Mutex<Vec<IngestEvent>>);
        impl IngestProgress for Recorder {
            fn report(&self, event: IngestEvent) {
                self.0.lock().unwrap().push(event);
            }
        }

        let store = InMemoryStore::new("issues");
        let embedder = CountingEmbedder::new(false);
        let lines: Vec<String> = (1..=5)
            .map(|i| format!("src/A.cs({},1): info R{}: message {}", i, i, i))
            .collect();
        let options = IngestOptions {
            batch_size: 2,
            ..opts()
        };
        let recorder = Recorder(Mutex::new(Vec::new()));
        let report = ingest(&store, &embedder, &LexicalResolver, &lines, &options, &recorder)
            .await
            .unwrap();

        assert_eq!(report.inserted, 5);
        assert_eq!(embedder.calls(), 3);
        let events = recorder.0.into_inner().unwrap();
        assert_eq!(events.first(), Some(&IngestEvent::Parsing));
        assert_eq!(events.last(), Some(&IngestEvent::Embedding { n: 5, total: 5 }));
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let store = InMemoryStore::new("issues");
        let embedder = HashEmbedder::new(32);
        let options = IngestOptions {
            batch_size: 0,
            ..opts()
        };
        assert!(ingest(&store, &embedder, &LexicalResolver, REPORT, &options, &NoProgress)
            .await
            .is_err());
    }
}
