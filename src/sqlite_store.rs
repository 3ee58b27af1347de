//! SQLite-backed [`IssueStore`] implementation.
//!
//! One database can hold several collections. A collection exists while it
//! has a row in `collections`; [`IssueStore::delete_all`] removes that row
//! together with every issue in it.
//!
//! Vectors are stored as little-endian f32 BLOBs next to the issue fields.
//! Nearest-neighbor search is a brute-force cosine scan over the
//! collection, which is fine for the issue counts one analysis run yields.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use diag_harness_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use diag_harness_core::models::{IssueRecord, RankedIssue};
use diag_harness_core::store::IssueStore;

use crate::config::Config;
use crate::db;
use crate::migrate;

/// SQLite implementation of the [`IssueStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
    page_size: usize,
    model: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, collection: &str) -> Self {
        Self {
            pool,
            collection: collection.to_string(),
            page_size: 500,
            model: "unknown".to_string(),
        }
    }

    /// Rows fetched per round trip by [`IssueStore::get_all`].
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Model name recorded next to each stored vector.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        record: &IssueRecord,
        embedding: &[f32],
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO issues (collection, identity, file, line, col, severity, rule_id,
                                rule_generated, message, embedding, model, dims, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, identity) DO NOTHING
            "#,
        )
        .bind(&self.collection)
        .bind(&record.identity)
        .bind(&record.file)
        .bind(record.line)
        .bind(record.column)
        .bind(&record.severity)
        .bind(&record.rule_id)
        .bind(record.rule_generated)
        .bind(&record.message)
        .bind(vec_to_blob(embedding))
        .bind(&self.model)
        .bind(embedding.len() as i64)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ensure_collection(&self, tx: &mut Transaction<'_, Sqlite>, now: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(&self.collection)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

/// Connect, make sure the schema exists, and wrap the pool for the configured collection.
pub async fn open(config: &Config, model: &str) -> Result<SqliteStore> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    Ok(SqliteStore::new(pool, &config.store.collection)
        .with_page_size(config.store.page_size)
        .with_model(model))
}

fn row_to_record(row: &SqliteRow) -> IssueRecord {
    IssueRecord {
        identity: row.get("identity"),
        file: row.get("file"),
        line: row.get("line"),
        column: row.get("col"),
        severity: row.get("severity"),
        rule_id: row.get("rule_id"),
        rule_generated: row.get("rule_generated"),
        message: row.get("message"),
    }
}

#[async_trait]
impl IssueStore for SqliteStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn exists(&self) -> Result<bool> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collections WHERE name = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n > 0)
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM issues WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn identities(&self) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT identity FROM issues WHERE collection = ?")
            .bind(&self.collection)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn put(&self, record: &IssueRecord, embedding: &[f32]) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        self.ensure_collection(&mut tx, now).await?;
        let inserted = self.insert(&mut tx, record, embedding, now).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn put_batch(&self, records: &[IssueRecord], embeddings: &[Vec<f32>]) -> Result<usize> {
        if records.len() != embeddings.len() {
            anyhow::bail!(
                "put_batch: {} records but {} embeddings",
                records.len(),
                embeddings.len()
            );
        }
        if records.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        self.ensure_collection(&mut tx, now).await?;
        let mut inserted = 0;
        for (record, embedding) in records.iter().zip(embeddings) {
            if self.insert(&mut tx, record, embedding, now).await? {
                inserted += 1;
            }
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn get_all(&self) -> Result<Vec<IssueRecord>> {
        let mut out = Vec::new();
        let mut after: i64 = 0;

        loop {
            let rows = sqlx::query(
                r#"
                SELECT seq, identity, file, line, col, severity, rule_id, rule_generated, message
                FROM issues
                WHERE collection = ? AND seq > ?
                ORDER BY seq ASC
                LIMIT ?
                "#,
            )
            .bind(&self.collection)
            .bind(after)
            .bind(self.page_size as i64)
            .fetch_all(&self.pool)
            .await?;

            let Some(last) = rows.last() else {
                break;
            };
            after = last.get("seq");
            let full_page = rows.len() == self.page_size;
            out.extend(rows.iter().map(row_to_record));
            if !full_page {
                break;
            }
        }

        Ok(out)
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<RankedIssue>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT identity, file, line, col, severity, rule_id, rule_generated, message, embedding
            FROM issues
            WHERE collection = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut ranked: Vec<RankedIssue> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                RankedIssue {
                    issue: row_to_record(row),
                    distance: Some(cosine_distance(query, &blob_to_vec(&blob))),
                }
            })
            .collect();

        // Stable sort keeps insertion order for equal distances.
        ranked.sort_by(RankedIssue::cmp_distance);
        ranked.truncate(k);
        Ok(ranked)
    }

    async fn delete_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM issues WHERE collection = ?")
            .bind(&self.collection)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(&self.collection)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
