//! `dx query`: answer a free-text question about the stored issues.

use anyhow::Result;

use diag_harness_core::query::{QueryOutcome, QueryResponse};

use crate::config::Config;
use crate::harness::Harness;

pub const NOT_READY_MESSAGE: &str = "Not ready: no issues have been ingested.";

pub async fn run_query(config: &Config, text: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    if top_k == Some(0) {
        anyhow::bail!("--top-k must be >= 1");
    }
    let harness = Harness::open(config).await?;
    let response = harness.query(text, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    Ok(())
}

fn print_response(response: &QueryResponse) {
    if response.outcome == QueryOutcome::NotReady {
        println!("{}", NOT_READY_MESSAGE);
        return;
    }
    if response.results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, result) in response.results.iter().enumerate() {
        println!("{}. {}", i + 1, result);
    }
}
