//! Storage abstraction for issue records.
//!
//! The [`IssueStore`] trait defines every storage operation the ingestion
//! pipeline and query engine need, so backends are pluggable (SQLite in the
//! app crate, [`memory::InMemoryStore`] here).
//!
//! A store operates on one named collection. A collection that was never
//! created (or was dropped by [`IssueStore::delete_all`]) is "missing", which
//! the query engine reports as not ready rather than as an error.

pub mod memory;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::models::{IssueRecord, RankedIssue};

/// Abstract storage backend for issue records and their embeddings.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`put`](IssueStore::put) | Store one record with its embedding (no-op on known identity) |
/// | [`put_batch`](IssueStore::put_batch) | Store many records |
/// | [`get_all`](IssueStore::get_all) | Every record, insertion order, uncapped |
/// | [`nearest`](IssueStore::nearest) | Records by ascending distance to a vector |
/// | [`identities`](IssueStore::identities) | Existing identity set for dedup |
/// | [`delete_all`](IssueStore::delete_all) | Drop the collection (idempotent) |
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Name of the collection this store reads and writes.
    fn collection(&self) -> &str;

    /// Whether the collection has been created.
    async fn exists(&self) -> Result<bool>;

    /// Number of stored records (0 for a missing collection).
    async fn count(&self) -> Result<usize>;

    /// Identities of every stored record.
    async fn identities(&self) -> Result<HashSet<String>>;

    /// Store a record with its embedding, creating the collection if needed.
    ///
    /// Returns `false` without modifying anything when the identity is
    /// already stored.
    async fn put(&self, record: &IssueRecord, embedding: &[f32]) -> Result<bool>;

    /// Store records with their embeddings (paired by index).
    ///
    /// Returns the number of records actually inserted.
    async fn put_batch(&self, records: &[IssueRecord], embeddings: &[Vec<f32>]) -> Result<usize> {
        if records.len() != embeddings.len() {
            anyhow::bail!(
                "put_batch: {} records but {} embeddings",
                records.len(),
                embeddings.len()
            );
        }
        let mut inserted = 0;
        for (record, embedding) in records.iter().zip(embeddings) {
            if self.put(record, embedding).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Every stored record in insertion order.
    async fn get_all(&self) -> Result<Vec<IssueRecord>>;

    /// Up to `k` records ordered by ascending distance to `query`.
    ///
    /// Ties keep insertion order.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<RankedIssue>>;

    /// Drop the whole collection. Dropping a missing collection is fine.
    async fn delete_all(&self) -> Result<()>;
}

/// Collection exists and holds at least one record.
pub async fn is_ready<S: IssueStore + ?Sized>(store: &S) -> Result<bool> {
    Ok(store.exists().await? && store.count().await? > 0)
}

/// Embed the record's canonical text and store it.
pub async fn put_record<S, E>(store: &S, embedder: &E, record: &IssueRecord) -> Result<bool>
where
    S: IssueStore + ?Sized,
    E: Embedder + ?Sized,
{
    let vector = crate::embedding::embed_query(embedder, &record.canonical_text()).await?;
    store.put(record, &vector).await
}
