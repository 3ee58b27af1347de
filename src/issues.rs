//! `dx issues` and `dx clear`: the reporting view over the collection.

use anyhow::Result;

use diag_harness_core::models::IssueRecord;

use crate::config::Config;
use crate::harness::Harness;

pub async fn run_issues(config: &Config, json: bool) -> Result<()> {
    let harness = Harness::open(config).await?;
    let issues = harness.all_issues().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
        return Ok(());
    }

    if issues.is_empty() {
        println!("No issues found.");
        return Ok(());
    }

    println!("Total issues: {}", issues.len());
    println!();
    for (i, issue) in issues.iter().enumerate() {
        print_issue(i + 1, issue);
    }
    Ok(())
}

fn print_issue(n: usize, issue: &IssueRecord) {
    println!("{}. {}", n, issue.file);
    println!("    line: {}, column: {}", position(issue.line), position(issue.column));
    println!("    severity: {}", issue.severity);
    if !issue.rule_generated {
        println!("    rule: {}", issue.rule_id);
    }
    println!("    message: {}", issue.message);
    println!();
}

fn position(value: i64) -> String {
    if value < 0 {
        "unknown".to_string()
    } else {
        value.to_string()
    }
}

pub async fn run_clear(config: &Config) -> Result<()> {
    let harness = Harness::open(config).await?;
    harness.clear().await?;
    println!("clear {}", config.store.collection);
    println!("ok");
    Ok(())
}
