//! In-memory [`IssueStore`] implementation for tests and embedding hosts.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`, so insertion order is
//! the vector order. Nearest-neighbor search is brute-force cosine distance.

use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::{IssueRecord, RankedIssue};

use super::IssueStore;

struct StoredIssue {
    record: IssueRecord,
    vector: Vec<f32>,
}

/// In-memory issue store. `None` means the collection is missing.
pub struct InMemoryStore {
    collection: String,
    issues: RwLock<Option<Vec<StoredIssue>>>,
}

impl InMemoryStore {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            issues: RwLock::new(None),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Option<Vec<StoredIssue>>>> {
        self.issues
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Option<Vec<StoredIssue>>>> {
        self.issues
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("default")
    }
}

#[async_trait]
impl IssueStore for InMemoryStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.read()?.is_some())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.as_ref().map_or(0, Vec::len))
    }

    async fn identities(&self) -> Result<HashSet<String>> {
        Ok(self
            .read()?
            .iter()
            .flatten()
            .map(|s| s.record.identity.clone())
            .collect())
    }

    async fn put(&self, record: &IssueRecord, embedding: &[f32]) -> Result<bool> {
        let mut guard = self.write()?;
        let issues = guard.get_or_insert_with(Vec::new);
        if issues.iter().any(|s| s.record.identity == record.identity) {
            return Ok(false);
        }
        issues.push(StoredIssue {
            record: record.clone(),
            vector: embedding.to_vec(),
        });
        Ok(true)
    }

    async fn get_all(&self) -> Result<Vec<IssueRecord>> {
        Ok(self
            .read()?
            .iter()
            .flatten()
            .map(|s| s.record.clone())
            .collect())
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<RankedIssue>> {
        let guard = self.read()?;
        let mut ranked: Vec<RankedIssue> = guard
            .iter()
            .flatten()
            .map(|s| RankedIssue {
                issue: s.record.clone(),
                distance: Some(cosine_distance(query, &s.vector)),
            })
            .collect();
        // sort_by is stable, so equal distances keep insertion order
        ranked.sort_by(RankedIssue::cmp_distance);
        ranked.truncate(k);
        Ok(ranked)
    }

    async fn delete_all(&self) -> Result<()> {
        *self.write()? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candidate;
    use crate::store::is_ready;

    fn rec(id: &str, file: &str) -> IssueRecord {
        Candidate::new(file, 1, 1, "warning", Some("R"), "m").into_record(id.to_string())
    }

    #[tokio::test]
    async fn missing_until_first_put() {
        let store = InMemoryStore::new("issues");
        assert!(!store.exists().await.unwrap());
        assert!(!is_ready(&store).await.unwrap());
        assert!(store.put(&rec("a", "a.cs"), &[1.0, 0.0]).await.unwrap());
        assert!(store.exists().await.unwrap());
        assert!(is_ready(&store).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_identity_is_a_noop() {
        let store = InMemoryStore::new("issues");
        assert!(store.put(&rec("a", "a.cs"), &[1.0]).await.unwrap());
        assert!(!store.put(&rec("a", "other.cs"), &[0.5]).await.unwrap());
        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].file, "a.cs");
    }

    #[tokio::test]
    async fn nearest_orders_by_distance_then_insertion() {
        let store = InMemoryStore::new("issues");
        store.put(&rec("far", "f.cs"), &[-1.0, 0.0]).await.unwrap();
        store.put(&rec("tie1", "t1.cs"), &[0.0, 1.0]).await.unwrap();
        store.put(&rec("near", "n.cs"), &[1.0, 0.1]).await.unwrap();
        store.put(&rec("tie2", "t2.cs"), &[0.0, 2.0]).await.unwrap();

        let out = store.nearest(&[1.0, 0.0], 4).await.unwrap();
        let ids: Vec<&str> = out.iter().map(|r| r.issue.identity.as_str()).collect();
        assert_eq!(ids, vec!["near", "tie1", "tie2", "far"]);

        let top = store.nearest(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert!(top[0].distance.unwrap() <= top[1].distance.unwrap());
    }

    #[tokio::test]
    async fn nan_vectors_rank_after_finite_distances() {
        let store = InMemoryStore::new("issues");
        store.put(&rec("nan", "x.cs"), &[f32::NAN, 0.0]).await.unwrap();
        store.put(&rec("near", "n.cs"), &[1.0, 0.0]).await.unwrap();
        store.put(&rec("far", "f.cs"), &[-1.0, 0.0]).await.unwrap();

        let out = store.nearest(&[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<&str> = out.iter().map(|r| r.issue.identity.as_str()).collect();
        assert_eq!(ids, vec!["near", "far", "nan"]);
    }

    #[tokio::test]
    async fn delete_all_is_idempotent() {
        let store = InMemoryStore::new("issues");
        store.delete_all().await.unwrap();
        store.put(&rec("a", "a.cs"), &[1.0]).await.unwrap();
        store.delete_all().await.unwrap();
        store.delete_all().await.unwrap();
        assert!(!store.exists().await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn put_batch_requires_matching_lengths() {
        let store = InMemoryStore::new("issues");
        assert!(store
            .put_batch(&[rec("a", "a.cs")], &[])
            .await
            .is_err());
        let n = store
            .put_batch(
                &[rec("a", "a.cs"), rec("b", "b.cs"), rec("a", "a.cs")],
                &[vec![1.0], vec![1.0], vec![1.0]],
            )
            .await
            .unwrap();
        assert_eq!(n, 2);
    }
}
