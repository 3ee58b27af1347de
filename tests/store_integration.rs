//! SqliteStore against the shared IssueStore contract, plus a full
//! ingest/query pass through the core pipeline on a real database.

use diag_harness::config::Config;
use diag_harness::resolve::FsResolver;
use diag_harness::sqlite_store;
use diag_harness_core::embedding::{Embedder, HashEmbedder};
use diag_harness_core::ingest::{self, IngestOptions, NoProgress};
use diag_harness_core::models::IssueRecord;
use diag_harness_core::query::{self, Intent, QueryOutcome};
use diag_harness_core::store::{self, IssueStore};
use tempfile::TempDir;

fn test_config(tmp: &TempDir, page_size: usize) -> Config {
    let text = format!(
        "[db]\npath = \"{}\"\n[store]\ncollection = \"test_issues\"\npage_size = {}\n",
        tmp.path().join("data/dx.sqlite").display(),
        page_size
    );
    toml::from_str(&text).unwrap()
}

fn record(id: &str, file: &str, line: i64, severity: &str, rule: &str, message: &str) -> IssueRecord {
    IssueRecord {
        identity: id.to_string(),
        file: file.to_string(),
        line,
        column: 1,
        severity: severity.to_string(),
        rule_id: rule.to_string(),
        rule_generated: false,
        message: message.to_string(),
    }
}

#[tokio::test]
async fn collection_missing_until_first_put() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, 500);
    let store = sqlite_store::open(&config, "hash-v1:64").await.unwrap();
    let embedder = HashEmbedder::new(64);

    assert!(!store.exists().await.unwrap());
    assert!(!store::is_ready(&store).await.unwrap());

    let r = record("a", "/r/A.cs", 1, "warning", "R1", "first");
    assert!(store::put_record(&store, &embedder, &r).await.unwrap());
    assert!(store.exists().await.unwrap());
    assert!(store::is_ready(&store).await.unwrap());
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn duplicate_put_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, 500);
    let store = sqlite_store::open(&config, "hash-v1:64").await.unwrap();
    let embedder = HashEmbedder::new(64);

    let r = record("same", "/r/A.cs", 1, "warning", "R1", "first");
    assert!(store::put_record(&store, &embedder, &r).await.unwrap());
    assert!(!store::put_record(&store, &embedder, &r).await.unwrap());
    assert_eq!(store.count().await.unwrap(), 1);
    assert!(store.identities().await.unwrap().contains("same"));
}

#[tokio::test]
async fn get_all_pages_in_insertion_order() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, 2);
    let store = sqlite_store::open(&config, "hash-v1:64").await.unwrap();
    let embedder = HashEmbedder::new(64);

    let records: Vec<IssueRecord> = (0..5)
        .map(|i| record(&format!("id-{}", i), "/r/A.cs", i + 1, "info", "R", &format!("m{}", i)))
        .collect();
    let texts: Vec<String> = records.iter().map(|r| r.canonical_text()).collect();
    let vectors = embedder.embed(&texts).await.unwrap();
    assert_eq!(store.put_batch(&records, &vectors).await.unwrap(), 5);

    let all = store.get_all().await.unwrap();
    let ids: Vec<&str> = all.iter().map(|r| r.identity.as_str()).collect();
    assert_eq!(ids, vec!["id-0", "id-1", "id-2", "id-3", "id-4"]);
}

#[tokio::test]
async fn nearest_orders_by_distance() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, 500);
    let store = sqlite_store::open(&config, "hash-v1:1024").await.unwrap();
    let embedder = HashEmbedder::new(1024);

    for r in [
        record("1", "/r/Net.cs", 4, "warning", "CA2000", "dispose objects before losing scope"),
        record("2", "/r/Db.cs", 9, "error", "CS8602", "dereference of a possibly null reference"),
        record("3", "/r/Ui.cs", 2, "info", "IDE0059", "unnecessary assignment of a value"),
    ] {
        store::put_record(&store, &embedder, &r).await.unwrap();
    }

    let probe = embedder
        .embed(&["possibly null reference dereference".to_string()])
        .await
        .unwrap()
        .remove(0);
    let hits = store.nearest(&probe, 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].issue.identity, "2");
    assert!(hits[0].distance.unwrap() <= hits[1].distance.unwrap());
}

#[tokio::test]
async fn delete_all_drops_the_collection() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, 500);
    let store = sqlite_store::open(&config, "hash-v1:64").await.unwrap();
    let embedder = HashEmbedder::new(64);

    store::put_record(&store, &embedder, &record("a", "/r/A.cs", 1, "warning", "R1", "x"))
        .await
        .unwrap();
    store.delete_all().await.unwrap();
    assert!(!store.exists().await.unwrap());
    assert_eq!(store.count().await.unwrap(), 0);

    // Idempotent on an already missing collection.
    store.delete_all().await.unwrap();
}

#[tokio::test]
async fn ingest_then_query_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let repo = tmp.path().join("repo");
    std::fs::create_dir_all(repo.join("src")).unwrap();
    std::fs::write(repo.join("src/A.cs"), "").unwrap();
    std::fs::write(repo.join("src/B.cs"), "").unwrap();

    let config = test_config(&tmp, 500);
    let store = sqlite_store::open(&config, "hash-v1:128").await.unwrap();
    let embedder = HashEmbedder::new(128);
    let resolver = FsResolver::new();
    let options = IngestOptions {
        repo_root: repo.canonicalize().unwrap().to_string_lossy().into_owned(),
        ..Default::default()
    };

    let report_lines = [
        "src/A.cs(1,1): warning R1: one",
        "src/A.cs(2,1): error R2: two",
        "B.cs(3,1): warning R1: three",
    ];
    let report = ingest::ingest(&store, &embedder, &resolver, report_lines, &options, &NoProgress)
        .await
        .unwrap();
    assert_eq!(report.inserted, 3);

    // The same issue reported through a different path spelling is a duplicate.
    let again = ingest::ingest(
        &store,
        &embedder,
        &resolver,
        ["src/B.cs(3,1): warning R1: three"],
        &options,
        &NoProgress,
    )
    .await
    .unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.skipped_duplicates, 1);

    let resp = query::query(&store, &embedder, "how many issues", 5).await.unwrap();
    assert_eq!(resp.intent, Intent::Count);
    assert_eq!(resp.outcome, QueryOutcome::Ready);
    assert_eq!(resp.results[0].to_string(), "Total issues: 3");

    let resp = query::query(&store, &embedder, "file with most issues", 1).await.unwrap();
    assert!(resp.results[0].to_string().ends_with("A.cs: 2 issues"));
}
