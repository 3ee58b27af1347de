//! JSON HTTP API.
//!
//! Exposes ingestion and querying over HTTP for editor integrations and
//! dashboards. One [`Harness`] is opened at startup and shared by every
//! handler; ingestion requests are serialized so each runs to completion
//! before the next starts.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (version and readiness) |
//! | `GET`  | `/issues` | Every stored issue, insertion order |
//! | `POST` | `/query` | Answer `{ "query", "top_k"? }` |
//! | `POST` | `/ingest` | Ingest `{ "text", "repo_root"?, "clear_existing"?, "format"? }` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embeddings_disabled` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use diag_harness_core::ingest::{IngestReport, NoProgress};
use diag_harness_core::models::IssueRecord;
use diag_harness_core::query::QueryResponse;
use diag_harness_core::report::ReportFormat;

use crate::config::Config;
use crate::harness::Harness;

#[derive(Clone)]
struct AppState {
    harness: Arc<Harness>,
    ingest_lock: Arc<Mutex<()>>,
}

/// Starts the HTTP server on `[server] bind`. Runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let harness = Harness::open(config).await?;
    let app = router(Arc::new(harness));

    let bind_addr = config.server.bind.clone();
    println!("dx server listening on http://{}", bind_addr);
    tracing::info!("serving collection '{}'", config.store.collection);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router over an opened harness.
pub fn router(harness: Arc<Harness>) -> Router {
    let state = AppState {
        harness,
        ingest_lock: Arc::new(Mutex::new(())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/issues", get(handle_issues))
        .route("/query", post(handle_query))
        .route("/ingest", post(handle_ingest))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Map a pipeline failure to a response. A disabled embedder is a
/// configuration problem on the caller's side, everything else is internal.
fn classify_error(err: anyhow::Error) -> AppError {
    let msg = format!("{:#}", err);
    if msg.contains("disabled") {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "embeddings_disabled".to_string(),
            message: msg,
        }
    } else {
        tracing::error!("request failed: {}", msg);
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: msg,
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    ready: bool,
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let ready = state.harness.is_ready().await.map_err(classify_error)?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ready,
    }))
}

// ============ GET /issues ============

#[derive(Serialize)]
struct IssuesResponse {
    total: usize,
    issues: Vec<IssueRecord>,
}

async fn handle_issues(State(state): State<AppState>) -> Result<Json<IssuesResponse>, AppError> {
    let issues = state.harness.all_issues().await.map_err(classify_error)?;
    Ok(Json(IssuesResponse {
        total: issues.len(),
        issues,
    }))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if req.top_k == Some(0) {
        return Err(bad_request("top_k must be >= 1"));
    }

    let response = state
        .harness
        .query(&req.query, req.top_k)
        .await
        .map_err(classify_error)?;
    Ok(Json(response))
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    text: String,
    #[serde(default)]
    repo_root: Option<PathBuf>,
    #[serde(default)]
    clear_existing: bool,
    #[serde(default)]
    format: Option<String>,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestReport>, AppError> {
    let format: ReportFormat = match req.format.as_deref() {
        Some(f) => f.parse().map_err(|e: anyhow::Error| bad_request(e.to_string()))?,
        None => ReportFormat::Auto,
    };

    let _guard = state.ingest_lock.lock().await;
    let options = state
        .harness
        .ingest_options(req.repo_root.as_deref(), req.clear_existing, format);
    let report = state
        .harness
        .ingest_lines(req.text.lines(), &options, &NoProgress)
        .await
        .map_err(classify_error)?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_state(provider: &str) -> (tempfile::TempDir, AppState) {
        let tmp = tempfile::TempDir::new().unwrap();
        let toml_text = format!(
            "[db]\npath = \"{}\"\n[embedding]\nprovider = \"{}\"\ndims = 64\n[ingest]\nrepo_root = \"{}\"\n",
            tmp.path().join("dx.sqlite").display(),
            provider,
            tmp.path().display()
        );
        let config: Config = toml::from_str(&toml_text).unwrap();
        let harness = Harness::open(&config).await.unwrap();
        let state = AppState {
            harness: Arc::new(harness),
            ingest_lock: Arc::new(Mutex::new(())),
        };
        (tmp, state)
    }

    #[tokio::test]
    async fn query_before_ingest_is_not_ready() {
        let (_tmp, state) = test_state("hash").await;
        let Json(resp) = handle_query(
            State(state),
            Json(QueryRequest {
                query: "how many issues".to_string(),
                top_k: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.outcome, diag_harness_core::query::QueryOutcome::NotReady);
        assert!(resp.results.is_empty());
    }

    #[tokio::test]
    async fn empty_query_is_bad_request() {
        let (_tmp, state) = test_state("hash").await;
        let err = handle_query(
            State(state),
            Json(QueryRequest {
                query: "  ".to_string(),
                top_k: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ingest_then_count() {
        let (_tmp, state) = test_state("hash").await;
        let Json(report) = handle_ingest(
            State(state.clone()),
            Json(IngestRequest {
                text: "a.cs(1,1): warning R1: one\nb.cs(2,1): error R2: two\n".to_string(),
                repo_root: None,
                clear_existing: false,
                format: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(report.inserted, 2);

        let Json(resp) = handle_query(
            State(state),
            Json(QueryRequest {
                query: "count".to_string(),
                top_k: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.results[0].to_string(), "Total issues: 2");
    }

    #[tokio::test]
    async fn disabled_embedder_maps_to_embeddings_disabled() {
        let (_tmp, state) = test_state("disabled").await;
        let err = handle_ingest(
            State(state),
            Json(IngestRequest {
                text: "a.cs(1,1): warning R1: one".to_string(),
                repo_root: None,
                clear_existing: false,
                format: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "embeddings_disabled");
    }
}
