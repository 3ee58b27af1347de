//! `dx ingest` and `dx analyze`: feed analyzer output into the store.
//!
//! Both commands end in [`Harness::ingest_lines`]; they differ only in where
//! the report lines come from (a captured file or stdin, or a fresh run of
//! the configured analyzer).

use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::{Path, PathBuf};

use diag_harness_core::ingest::IngestReport;
use diag_harness_core::report::ReportFormat;

use crate::analyzer;
use crate::config::Config;
use crate::harness::Harness;
use crate::progress::ProgressMode;

/// Read report lines from a file, or from stdin when `source` is `-`.
pub fn read_report(source: &Path) -> Result<Vec<String>> {
    if source == Path::new("-") {
        let stdin = std::io::stdin();
        return stdin
            .lock()
            .lines()
            .collect::<std::io::Result<Vec<String>>>()
            .context("Failed to read report from stdin");
    }

    let text = std::fs::read_to_string(source)
        .with_context(|| format!("Failed to read report: {}", source.display()))?;
    Ok(text.lines().map(str::to_string).collect())
}

pub async fn run_ingest(
    config: &Config,
    source: &Path,
    repo_root: Option<PathBuf>,
    clear: bool,
    format: &str,
    progress: ProgressMode,
) -> Result<()> {
    let format: ReportFormat = format.parse()?;
    let lines = read_report(source)?;

    let harness = Harness::open(config).await?;
    let options = harness.ingest_options(repo_root.as_deref(), clear, format);
    let reporter = progress.reporter();
    let report = harness
        .ingest_lines(&lines, &options, reporter.as_ref())
        .await?;

    print_report("ingest", &source.display().to_string(), &options.repo_root, &report);
    Ok(())
}

pub async fn run_analyze(config: &Config, clear: bool, progress: ProgressMode) -> Result<()> {
    let root = config.ingest.repo_root.clone();
    let analyzer_config = config.analyzer.clone();
    let lines = tokio::task::spawn_blocking(move || {
        analyzer::run_external_analyzer(&analyzer_config, &root)
    })
    .await
    .context("Analyzer task failed")??;

    let format = if config.analyzer.per_file {
        ReportFormat::Sectioned
    } else {
        ReportFormat::Auto
    };

    let harness = Harness::open(config).await?;
    let options = harness.ingest_options(None, clear, format);
    let reporter = progress.reporter();
    let report = harness
        .ingest_lines(&lines, &options, reporter.as_ref())
        .await?;

    print_report("analyze", &config.analyzer.command, &options.repo_root, &report);
    Ok(())
}

fn print_report(command: &str, source: &str, repo_root: &str, report: &IngestReport) {
    println!("{} {}", command, source);
    println!("  repo root: {}", repo_root);
    if report.parsed == 0 {
        println!("  nothing to ingest");
    } else {
        println!("  parsed: {}", report.parsed);
        println!("  new: {}", report.admitted);
        println!("  duplicates skipped: {}", report.skipped_duplicates);
        println!("  inserted: {}", report.inserted);
    }
    if report.malformed > 0 {
        println!("  malformed lines: {}", report.malformed);
    }
    println!("ok");
}
