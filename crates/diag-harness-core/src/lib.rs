//! # Diagnostic Harness Core
//!
//! Shared logic for Diagnostic Harness: the diagnostic parser, report
//! canonicalization, deduplication, the issue store abstraction, the
//! embedding trait, the ingestion pipeline, and the hybrid query engine.
//!
//! This crate contains no tokio runtime, sqlx, HTTP, or filesystem I/O.
//! Storage and embedding backends are supplied by the caller through the
//! [`store::IssueStore`] and [`embedding::Embedder`] traits.
//!
//! ## Data Flow
//!
//! ```text
//! raw text ──▶ parse ──▶ dedup ──▶ IssueStore (embed + persist)
//!                                        │
//!                      query ◀───────────┘
//! ```

pub mod dedup;
pub mod embedding;
pub mod ingest;
pub mod models;
pub mod parse;
pub mod query;
pub mod report;
pub mod store;
