//! Filesystem-backed path resolution.
//!
//! [`FsResolver`] maps the path hint of a diagnostic to a canonical absolute
//! path under the repository root:
//!
//! 1. an absolute hint that exists resolves to its canonical form;
//! 2. a relative hint that exists under the root resolves to the joined path;
//! 3. otherwise the hint is matched as a path suffix against an index of
//!    every file under the root, built on first use. Exactly one match wins.
//!
//! Anything else (missing, or several files share the suffix) is `None`, and
//! ingestion keeps the literal hint.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use walkdir::WalkDir;

use diag_harness_core::dedup::PathResolver;
use diag_harness_core::models::UNKNOWN_FILE;

const SKIPPED_DIRS: &[&str] = &[".git", "bin", "obj", "target", "node_modules"];

/// [`PathResolver`] that consults the filesystem.
#[derive(Default)]
pub struct FsResolver {
    index: Mutex<HashMap<String, Vec<String>>>,
}

impl FsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn suffix_match(&self, hint: &str, repo_root: &str) -> Option<String> {
        let mut index = self.index.lock().ok()?;
        let files = index
            .entry(repo_root.to_string())
            .or_insert_with(|| index_files(Path::new(repo_root)));

        let suffix = format!("/{}", hint.trim_start_matches("./").trim_start_matches('/'));
        let mut matches = files.iter().filter(|f| f.ends_with(&suffix));
        let first = matches.next()?;
        if matches.next().is_some() {
            tracing::debug!("path hint '{}' is ambiguous under {}", hint, repo_root);
            return None;
        }
        Some(first.clone())
    }
}

fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn canonical(path: &Path) -> Option<String> {
    std::fs::canonicalize(path).ok().map(|p| to_slash(&p))
}

fn index_files(root: &Path) -> Vec<String> {
    let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let files: Vec<String> = WalkDir::new(&root)
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && SKIPPED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| to_slash(e.path()))
        .collect();
    tracing::debug!("indexed {} files under {}", files.len(), root.display());
    files
}

impl PathResolver for FsResolver {
    fn resolve(&self, hint: &str, repo_root: &str) -> Option<String> {
        let hint = hint.trim();
        if hint.is_empty() || hint == UNKNOWN_FILE {
            return None;
        }
        let normalized = hint.replace('\\', "/");
        let path = PathBuf::from(&normalized);

        if path.is_absolute() {
            if let Some(found) = canonical(&path) {
                return Some(found);
            }
        } else if !repo_root.is_empty() {
            if let Some(found) = canonical(&Path::new(repo_root).join(&path)) {
                return Some(found);
            }
        }

        if repo_root.is_empty() {
            return None;
        }
        self.suffix_match(&normalized, repo_root)
    }
}
