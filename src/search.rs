//! Search orchestration shared by the CLI and the HTTP server.
//!
//! Wires the configured embedder and the SQLite index into a
//! [`RetrievalService`], times each call, and writes a query-log row
//! whether the search succeeded or not.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::warn;

use chat_recall_core::context::build_context_block;
use chat_recall_core::error::SearchError;
use chat_recall_core::models::{ScoreBreakdown, ScoredCandidate};
use chat_recall_core::rank::is_valid_max_distance;
use chat_recall_core::search::{RetrievalService, SearchReport};

use crate::config::Config;
use crate::embedding;
use crate::query_log::{record_query, QueryRecord};
use crate::sqlite_store::SqliteStore;

/// One ranked hit as presented to CLI and HTTP callers.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub id: i64,
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub text: String,
    pub timestamp: String, // ISO8601
    pub sender_name: Option<String>,
    pub sender_username: Option<String>,
    pub distance: f64,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreBreakdown>,
}

impl SearchResultItem {
    pub fn from_scored(scored: &ScoredCandidate, explain: bool) -> Self {
        let m = &scored.message;
        Self {
            id: m.id,
            channel_id: m.channel_id.clone(),
            channel_name: m.channel_name.clone(),
            text: m.text.clone(),
            timestamp: m.timestamp.to_rfc3339(),
            sender_name: m.sender_name.clone(),
            sender_username: m.sender_username.clone(),
            distance: scored.distance,
            score: scored.score.combined,
            explain: explain.then_some(scored.score),
        }
    }
}

/// Build the retrieval service for `config`, backed by `store`.
pub fn build_service(config: &Config, store: Arc<SqliteStore>) -> Result<RetrievalService> {
    let embedder = embedding::create_embedder(&config.embedding)?;
    Ok(RetrievalService::new(
        embedder,
        store,
        config.retrieval.params(),
    )?)
}

/// Run one search and log it.
///
/// A failure to write the log row is reported and otherwise ignored; it
/// never changes the search result.
pub async fn logged_search(
    service: &RetrievalService,
    store: &SqliteStore,
    query: &str,
    limit: usize,
    max_distance: f64,
) -> Result<SearchReport, SearchError> {
    let started = Instant::now();
    let result = service
        .search_with_max_distance(query, limit, max_distance)
        .await;

    let record = match &result {
        Ok(report) => QueryRecord {
            query_text: query,
            status: Some(report.status),
            candidates_fetched: report.candidates_fetched,
            message_ids: report.results.iter().map(|r| r.message.id).collect(),
            error_message: None,
            response_time_ms: started.elapsed().as_millis(),
        },
        Err(e) => QueryRecord {
            query_text: query,
            status: None,
            candidates_fetched: 0,
            message_ids: Vec::new(),
            error_message: Some(e.to_string()),
            response_time_ms: started.elapsed().as_millis(),
        },
    };

    if let Err(e) = record_query(store.pool(), &record).await {
        warn!(error = %e, "failed to write query log");
    }

    result
}

pub struct SearchOptions {
    pub limit: Option<usize>,
    pub max_distance: Option<f64>,
    pub explain: bool,
    pub json: bool,
    pub context: bool,
}

pub async fn run_search(config: &Config, query: &str, opts: SearchOptions) -> Result<()> {
    let limit = opts.limit.unwrap_or(config.retrieval.default_limit);
    let max_distance = opts.max_distance.unwrap_or(config.retrieval.max_distance);
    if !is_valid_max_distance(max_distance) {
        bail!(
            "--max-distance must be a finite value in [0.0, 2.0], got {}",
            max_distance
        );
    }

    let store = Arc::new(SqliteStore::open(config).await?);
    let service = build_service(config, store.clone())?;

    let report = logged_search(&service, &store, query, limit, max_distance).await;
    store.pool().close().await;
    let report = report?;

    if opts.json {
        let items: Vec<SearchResultItem> = report
            .results
            .iter()
            .map(|r| SearchResultItem::from_scored(r, opts.explain))
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if report.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    if opts.context {
        let messages = report.into_messages();
        println!("{}", build_context_block(&messages));
        return Ok(());
    }

    for (i, r) in report.results.iter().enumerate() {
        let m = &r.message;
        let channel = m.channel_name.as_deref().unwrap_or(&m.channel_id);
        let sender = m
            .sender_username
            .as_deref()
            .or(m.sender_name.as_deref())
            .unwrap_or("unknown");
        println!(
            "{}. [{:.2}] #{} {} / {} / {}",
            i + 1,
            r.score.combined,
            m.id,
            channel,
            sender,
            m.timestamp.format("%Y-%m-%d %H:%M")
        );
        println!("    distance: {:.4}", r.distance);
        if opts.explain {
            let s = &r.score;
            println!(
                "    semantic={:.3} keyword={:.3} phrase={:.3} long={:.3} partial={:.3}",
                s.semantic, s.keyword, s.exact_phrase, s.long_text, s.partial
            );
        }
        println!("    > {}", snippet(&m.text, 200));
        println!();
    }

    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}
