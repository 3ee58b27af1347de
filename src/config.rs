//! TOML configuration for the `dx` binary.
//!
//! Every section except `[db]` is optional and falls back to defaults, so a
//! minimal config is:
//!
//! ```toml
//! [db]
//! path = "./data/dx.sqlite"
//! ```
//!
//! [`load_config`] parses and validates the file; validation failures are
//! reported with the offending key.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use diag_harness_core::ingest::DEFAULT_BATCH_SIZE;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Rows fetched per page when listing every issue.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            page_size: default_page_size(),
        }
    }
}

fn default_collection() -> String {
    "analyzer_issues".to_string()
}
fn default_page_size() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_repo_root")]
    pub repo_root: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            repo_root: default_repo_root(),
        }
    }
}

fn default_repo_root() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyzerConfig {
    #[serde(default = "default_analyzer_command")]
    pub command: String,
    #[serde(default = "default_analyzer_args")]
    pub args: Vec<String>,
    /// Run the analyzer once per selected file instead of once for the root.
    #[serde(default = "default_per_file")]
    pub per_file: bool,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            command: default_analyzer_command(),
            args: default_analyzer_args(),
            per_file: default_per_file(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_analyzer_command() -> String {
    "roslynator".to_string()
}
fn default_analyzer_args() -> Vec<String> {
    vec!["analyze".to_string()]
}
fn default_per_file() -> bool {
    true
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.cs".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.store.collection.trim().is_empty() {
        anyhow::bail!("store.collection must not be empty");
    }
    if config.store.page_size < 1 {
        anyhow::bail!("store.page_size must be >= 1");
    }
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.embedding.batch_size < 1 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, or ollama.",
            other
        ),
    }

    if config.embedding.is_enabled()
        && (config.embedding.dims.is_none() || config.embedding.dims == Some(0))
    {
        anyhow::bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama")
        && config.embedding.model.is_none()
    {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse("[db]\npath = \"x.sqlite\"\n").unwrap();
        assert_eq!(config.store.collection, "analyzer_issues");
        assert_eq!(config.store.page_size, 500);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.analyzer.command, "roslynator");
        assert_eq!(config.analyzer.include_globs, vec!["**/*.cs"]);
        assert_eq!(config.server.bind, "127.0.0.1:7341");
    }

    #[test]
    fn hash_provider_needs_dims() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"hash\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"hash\"\ndims = 64\n").is_ok());
    }

    #[test]
    fn network_providers_need_model() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\ndims = 8\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn rejects_unknown_provider_and_zero_top_k() {
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[retrieval]\ntop_k = 0\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[store]\npage_size = 0\n").is_err());
    }

    #[test]
    fn example_config_is_valid() {
        let config = parse(include_str!("../config/dx.example.toml")).unwrap();
        assert_eq!(config.embedding.dims, Some(384));
        assert!(config.analyzer.per_file);
    }
}
