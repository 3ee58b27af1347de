//! Issue identity and admission.
//!
//! Every candidate gets a stable identity derived from its rule code, its
//! path resolved against the repository root, and its line:
//!
//! ```text
//! identity = sha256(rule_id \0 normalized_path \0 line)
//! ```
//!
//! Candidates whose rule code was generated (the source had none) use a
//! content key instead, `sha256("content" \0 normalized_path \0 line \0 message)`,
//! so they still deduplicate across separate ingestion runs.
//!
//! Path resolution is best effort: when the [`PathResolver`] cannot map a
//! hint, the literal hint is used and ingestion carries on.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::models::{Candidate, IssueRecord, UNKNOWN_FILE};

/// Maps a path hint from a diagnostic to an absolute path.
pub trait PathResolver: Send + Sync {
    /// Returns `None` when the hint cannot be resolved.
    fn resolve(&self, hint: &str, repo_root: &str) -> Option<String>;
}

/// Resolver that works on path text only, without touching the filesystem.
///
/// Relative hints are joined onto the root; `.` and `..` segments are
/// collapsed and `\` separators are folded to `/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalResolver;

impl PathResolver for LexicalResolver {
    fn resolve(&self, hint: &str, repo_root: &str) -> Option<String> {
        let hint = hint.trim();
        if hint.is_empty() || hint == UNKNOWN_FILE {
            return None;
        }
        let hint = hint.replace('\\', "/");
        if is_absolute(&hint) {
            return Some(collapse(&hint));
        }
        let root = repo_root.trim().replace('\\', "/");
        if root.is_empty() {
            return None;
        }
        Some(collapse(&format!("{}/{}", root.trim_end_matches('/'), hint)))
    }
}

fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || (bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/')
}

fn collapse(path: &str) -> String {
    let (prefix, rest) = if let Some(stripped) = path.strip_prefix('/') {
        ("/", stripped)
    } else if path.as_bytes().get(1..3) == Some(b":/".as_slice()) {
        (&path[..3], &path[3..])
    } else {
        ("", path)
    };

    let mut parts: Vec<&str> = Vec::new();
    for seg in rest.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("{}{}", prefix, parts.join("/"))
}

/// Resolve `hint` with `resolver`, falling back to the literal hint.
pub fn normalized_path(resolver: &dyn PathResolver, hint: &str, repo_root: &str) -> String {
    match resolver.resolve(hint, repo_root) {
        Some(path) => path,
        None => {
            tracing::debug!("could not resolve path hint '{}', keeping it verbatim", hint);
            hint.to_string()
        }
    }
}

/// Compute the identity of a candidate given its normalized path.
pub fn identity(candidate: &Candidate, normalized_path: &str) -> String {
    let mut hasher = Sha256::new();
    if candidate.rule_generated {
        hasher.update(b"content");
        hasher.update([0u8]);
        hasher.update(normalized_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(candidate.line.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(candidate.message.as_bytes());
    } else {
        hasher.update(candidate.rule_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(normalized_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(candidate.line.to_string().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Admission filter for one ingestion batch.
///
/// Seeded once with the identities already in the store; every admitted
/// identity is added so in-batch repeats are dropped too.
pub struct Deduplicator<'a> {
    resolver: &'a dyn PathResolver,
    repo_root: String,
    seen: HashSet<String>,
}

impl<'a> Deduplicator<'a> {
    pub fn new(resolver: &'a dyn PathResolver, repo_root: &str, existing: HashSet<String>) -> Self {
        Self {
            resolver,
            repo_root: repo_root.to_string(),
            seen: existing,
        }
    }

    /// Identity of `candidate` under this batch's resolver and root.
    pub fn identify(&self, candidate: &Candidate) -> String {
        let path = normalized_path(self.resolver, &candidate.file, &self.repo_root);
        identity(candidate, &path)
    }

    /// Returns the record to store, or `None` when the identity is known.
    pub fn admit(&mut self, candidate: Candidate) -> Option<IssueRecord> {
        let id = self.identify(&candidate);
        if self.seen.insert(id.clone()) {
            Some(candidate.into_record(id))
        } else {
            None
        }
    }
}
