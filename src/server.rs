//! JSON HTTP API over the retrieval pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/search` | Hybrid-ranked messages for a query |
//! | `GET`  | `/messages/{id}` | One stored message |
//! | `GET`  | `/health` | Health check (returns version and message count) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "search_unavailable", "message": "vector index unavailable: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `search_unavailable` (503), `internal` (500).
//!
//! A blank query or an embedding failure is not an error: the response is
//! `200` with an empty `results` array and a `status` naming the outcome.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use chat_recall_core::context::build_context_block;
use chat_recall_core::error::SearchError;
use chat_recall_core::rank::is_valid_max_distance;
use chat_recall_core::search::{RetrievalService, SearchStatus};
use chat_recall_core::store::MessageStore;

use crate::config::Config;
use crate::get::{get_message, MessageResponse};
use crate::search::{build_service, logged_search, SearchResultItem};
use crate::sqlite_store::SqliteStore;

/// Upper bound on `limit` accepted over HTTP.
pub const MAX_HTTP_LIMIT: usize = 100;

/// Shared state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub service: Arc<RetrievalService>,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(SqliteStore::open(config).await?);
        let service = build_service(config, store.clone())?;
        Ok(Self {
            config: Arc::new(config.clone()),
            store,
            service: Arc::new(service),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", post(handle_search))
        .route("/messages/{id}", get(handle_get_message))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("recall server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
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

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: err.to_string(),
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidMaxDistance(_) => bad_request(err.to_string()),
            SearchError::Index(_) => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "search_unavailable",
                message: err.to_string(),
            },
        }
    }
}

// ============ POST /search ============

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub max_distance: Option<f64>,
    /// Include the per-signal score breakdown.
    #[serde(default)]
    pub explain: bool,
    /// Include the joined context block.
    #[serde(default)]
    pub context: bool,
}

#[derive(Serialize)]
struct SearchResponse {
    status: SearchStatus,
    candidates_fetched: usize,
    results: Vec<SearchResultItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let limit = req.limit.unwrap_or(state.config.retrieval.default_limit);
    if limit > MAX_HTTP_LIMIT {
        return Err(bad_request(format!(
            "limit must be at most {}",
            MAX_HTTP_LIMIT
        )));
    }
    let max_distance = req
        .max_distance
        .unwrap_or(state.config.retrieval.max_distance);
    if !is_valid_max_distance(max_distance) {
        return Err(bad_request("max_distance must be a finite value in [0.0, 2.0]"));
    }

    let report = logged_search(
        &state.service,
        &state.store,
        &req.query,
        limit,
        max_distance,
    )
    .await?;

    let results: Vec<SearchResultItem> = report
        .results
        .iter()
        .map(|r| SearchResultItem::from_scored(r, req.explain))
        .collect();
    let context = req.context.then(|| {
        let messages: Vec<_> = report.results.iter().map(|r| r.message.clone()).collect();
        build_context_block(&messages)
    });

    Ok(Json(SearchResponse {
        status: report.status,
        candidates_fetched: report.candidates_fetched,
        results,
        context,
    }))
}

// ============ GET /messages/{id} ============

async fn handle_get_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    match get_message(&state.store, id).await.map_err(internal)? {
        Some(msg) => Ok(Json(msg)),
        None => Err(not_found(format!("message not found: {}", id))),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    messages: u64,
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let messages = state.store.count_messages().await.map_err(internal)?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        messages,
    }))
}
