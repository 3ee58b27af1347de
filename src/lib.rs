//! # Diagnostic Harness
//!
//! Ingests static-analysis diagnostic output, normalizes it into
//! deduplicated issue records with embeddings, and answers natural-language
//! questions about the result with a mix of rule-based shortcuts and
//! nearest-neighbor ranking.
//!
//! The parsing, deduplication, and query logic lives in
//! [`diag_harness_core`]; this crate adds configuration, SQLite persistence,
//! embedding providers, the analyzer runner, the `dx` CLI commands, and the
//! HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Analyzer  │──▶│   Pipeline   │──▶│  SQLite  │
//! │ (external) │   │ Parse+Dedup  │   │ + Vectors│
//! └────────────┘   │ +Embed       │   └────┬─────┘
//!                  └──────────────┘        │
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │   (dx)   │       │   API    │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dx init                          # create database
//! dx analyze                       # run the analyzer and ingest its output
//! dx ingest report.txt --repo-root ./src
//! dx query "file with most issues"
//! dx serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite-backed issue store |
//! | [`embedding`] | Embedding providers |
//! | [`resolve`] | Filesystem path resolution |
//! | [`analyzer`] | External analyzer runner |
//! | [`harness`] | Store + embedder + resolver, assembled |
//! | [`ingest`] | `dx ingest` / `dx analyze` |
//! | [`query`] | `dx query` |
//! | [`issues`] | `dx issues` / `dx clear` |
//! | [`stats`] | `dx stats` |
//! | [`progress`] | Ingest progress on stderr |
//! | [`server`] | HTTP server |

pub mod analyzer;
pub mod config;
pub mod db;
pub mod embedding;
pub mod harness;
pub mod ingest;
pub mod issues;
pub mod migrate;
pub mod progress;
pub mod query;
pub mod resolve;
pub mod server;
pub mod sqlite_store;
pub mod stats;
