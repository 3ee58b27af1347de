//! External analyzer runner.
//!
//! Selects source files under the repository root with include/exclude
//! globs and runs the configured analyzer command, capturing its stdout as
//! report lines for the ingestion pipeline.
//!
//! In per-file mode every file gets its own invocation and its output is
//! introduced by a `=== <path> ===` header, which the sectioned report
//! parser uses to attribute free-form lines to the right file.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

use diag_harness_core::report::section_header;

use crate::config::AnalyzerConfig;

/// Files under `root` matching the include globs and none of the excludes.
///
/// Globs are matched against the path relative to `root`. Version control
/// and build output directories are always excluded. Output is sorted.
pub fn select_files(root: &Path, config: &AnalyzerConfig) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        bail!("Repository root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/bin/**".to_string(),
        "**/obj/**".to_string(),
    ];
    excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Run the analyzer once with `target` appended to the configured args.
fn invoke(config: &AnalyzerConfig, target: &Path) -> Result<Vec<String>> {
    let output = Command::new(&config.command)
        .args(&config.args)
        .arg(target)
        .output()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                anyhow::anyhow!(
                    "Analyzer command '{}' not found. Install it or set [analyzer] command in the config.",
                    config.command
                )
            } else {
                anyhow::anyhow!("Failed to run analyzer '{}': {}", config.command, e)
            }
        })?;

    // Analyzers commonly exit non-zero when they report diagnostics.
    if !output.status.success() {
        tracing::debug!(
            "analyzer exited with {} for {}",
            output.status,
            target.display()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect())
}

/// Run the analyzer over `root` and return the captured report lines.
pub fn run_external_analyzer(config: &AnalyzerConfig, root: &Path) -> Result<Vec<String>> {
    if !config.per_file {
        tracing::info!("running {} on {}", config.command, root.display());
        return invoke(config, root);
    }

    let files = select_files(root, config)?;
    tracing::info!("running {} on {} files", config.command, files.len());

    let mut lines = Vec::new();
    for file in &files {
        let header = format!("=== {} ===", file.display());
        debug_assert!(section_header(&header).is_some());
        lines.push(header);
        lines.extend(invoke(config, file)?);
        lines.push(String::new());
    }
    Ok(lines)
}
