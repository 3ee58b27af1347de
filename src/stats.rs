//! Collection statistics.
//!
//! Used by `dx stats` to show what has been ingested: totals, readiness,
//! and breakdowns by severity and by rule.

use anyhow::Result;
use sqlx::Row;

use diag_harness_core::store::IssueStore;

use crate::config::Config;
use crate::harness::Harness;

/// Number of rules listed in the breakdown.
const TOP_RULES: i64 = 10;

pub async fn run_stats(config: &Config) -> Result<()> {
    let harness = Harness::open(config).await?;
    let store = &harness.store;
    let pool = store.pool();

    let total = store.count().await?;
    let ready = harness.is_ready().await?;
    let files: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT file) FROM issues WHERE collection = ?")
            .bind(store.collection())
            .fetch_one(pool)
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Diagnostic Harness: Collection Stats");
    println!("====================================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Collection:  {}", store.collection());
    println!("  Ready:       {}", if ready { "yes" } else { "no" });
    println!();
    println!("  Issues:      {}", total);
    println!("  Files:       {}", files);

    let severity_rows = sqlx::query(
        r#"
        SELECT severity, COUNT(*) AS n
        FROM issues
        WHERE collection = ?
        GROUP BY severity
        ORDER BY n DESC, severity ASC
        "#,
    )
    .bind(store.collection())
    .fetch_all(pool)
    .await?;

    if !severity_rows.is_empty() {
        println!();
        println!("  By severity:");
        for row in &severity_rows {
            let severity: String = row.get("severity");
            let n: i64 = row.get("n");
            println!("  {:<16} {:>8}", severity, n);
        }
    }

    let rule_rows = sqlx::query(
        r#"
        SELECT rule_id, COUNT(*) AS n
        FROM issues
        WHERE collection = ? AND rule_generated = 0
        GROUP BY rule_id
        ORDER BY n DESC, rule_id ASC
        LIMIT ?
        "#,
    )
    .bind(store.collection())
    .bind(TOP_RULES)
    .fetch_all(pool)
    .await?;

    if !rule_rows.is_empty() {
        println!();
        println!("  Top rules:");
        for row in &rule_rows {
            let rule: String = row.get("rule_id");
            let n: i64 = row.get("n");
            println!("  {:<16} {:>8}", rule, n);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
