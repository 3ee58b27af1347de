//! The assembled engine: one store, one embedder, one path resolver.
//!
//! A [`Harness`] is built once per command (or once per server) and passed
//! by reference to everything that ingests or queries. It is the app-level
//! surface of the pipeline:
//!
//! | Method | Operation |
//! |--------|-----------|
//! | [`ingest_lines`](Harness::ingest_lines) | parse, dedup, embed, and store a report |
//! | [`query`](Harness::query) | classify and answer a free-text query |
//! | [`all_issues`](Harness::all_issues) | every stored issue, insertion order |
//! | [`is_ready`](Harness::is_ready) | collection exists and is non-empty |
//! | [`clear`](Harness::clear) | drop the collection |

use anyhow::Result;
use std::path::Path;

use diag_harness_core::embedding::Embedder;
use diag_harness_core::ingest::{self, IngestOptions, IngestProgress, IngestReport};
use diag_harness_core::models::IssueRecord;
use diag_harness_core::query::{self, QueryResponse};
use diag_harness_core::report::ReportFormat;
use diag_harness_core::store::{self, IssueStore};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::resolve::FsResolver;
use crate::sqlite_store::{self, SqliteStore};

pub struct Harness {
    pub store: SqliteStore,
    pub embedder: Box<dyn Embedder>,
    resolver: FsResolver,
    config: Config,
}

impl Harness {
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = create_provider(&config.embedding)?;
        let store = sqlite_store::open(config, embedder.model_name()).await?;
        tracing::debug!(
            "opened collection '{}' with embedder {}",
            store.collection(),
            embedder.model_name()
        );
        Ok(Self {
            store,
            embedder,
            resolver: FsResolver::new(),
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ingest options from config, with optional per-call overrides.
    pub fn ingest_options(
        &self,
        repo_root: Option<&Path>,
        clear_existing: bool,
        format: ReportFormat,
    ) -> IngestOptions {
        let root = repo_root.unwrap_or(&self.config.ingest.repo_root);
        IngestOptions {
            repo_root: root_string(root),
            clear_existing,
            format,
            batch_size: self.config.embedding.batch_size,
        }
    }

    pub async fn ingest_lines<I, L>(
        &self,
        lines: I,
        options: &IngestOptions,
        progress: &dyn IngestProgress,
    ) -> Result<IngestReport>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        ingest::ingest(
            &self.store,
            &*self.embedder,
            &self.resolver,
            lines,
            options,
            progress,
        )
        .await
    }

    /// Answer a query; `top_k` falls back to `[retrieval] top_k`.
    pub async fn query(&self, text: &str, top_k: Option<usize>) -> Result<QueryResponse> {
        let k = top_k.unwrap_or(self.config.retrieval.top_k);
        query::query(&self.store, &*self.embedder, text, k).await
    }

    pub async fn all_issues(&self) -> Result<Vec<IssueRecord>> {
        query::all_issues(&self.store).await
    }

    pub async fn is_ready(&self) -> Result<bool> {
        store::is_ready(&self.store).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.delete_all().await
    }
}

/// Canonical, `/`-separated form of the repository root.
fn root_string(root: &Path) -> String {
    let resolved = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    resolved.to_string_lossy().replace('\\', "/")
}
