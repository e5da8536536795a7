//! Query log: one row per search, for finding queries that returned nothing.
//!
//! Entries record the search outcome, the ids of the messages handed back
//! as context, and the wall-clock response time.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use chat_recall_core::search::SearchStatus;

#[derive(Debug, Clone, Serialize)]
pub struct QueryLogEntry {
    pub id: String,
    pub query_text: String,
    pub status: String,
    pub candidates_fetched: i64,
    pub result_count: i64,
    pub context_message_ids: Vec<i64>,
    pub error_message: Option<String>,
    pub queried_at: DateTime<Utc>,
    pub response_time_ms: i64,
}

/// What a finished search looked like, ready to log.
pub struct QueryRecord<'a> {
    pub query_text: &'a str,
    pub status: Option<SearchStatus>,
    pub candidates_fetched: usize,
    pub message_ids: Vec<i64>,
    pub error_message: Option<String>,
    pub response_time_ms: u128,
}

/// Status string stored for a search that errored out.
pub const STATUS_ERROR: &str = "error";

pub async fn record_query(pool: &SqlitePool, record: &QueryRecord<'_>) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let status = record.status.map(|s| s.as_str()).unwrap_or(STATUS_ERROR);
    let ids_json = serde_json::to_string(&record.message_ids)?;

    sqlx::query(
        r#"
        INSERT INTO query_log (id, query_text, status, candidates_fetched, result_count,
                               context_message_ids, error_message, queried_at, response_time_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(record.query_text)
    .bind(status)
    .bind(record.candidates_fetched as i64)
    .bind(record.message_ids.len() as i64)
    .bind(&ids_json)
    .bind(&record.error_message)
    .bind(Utc::now().timestamp_millis())
    .bind(record.response_time_ms as i64)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Most recent entries first. With `no_results`, only searches that
/// returned zero messages.
pub async fn list_queries(
    pool: &SqlitePool,
    limit: usize,
    no_results: bool,
) -> Result<Vec<QueryLogEntry>> {
    let filter = if no_results { "WHERE result_count = 0" } else { "" };
    let sql = format!(
        "SELECT id, query_text, status, candidates_fetched, result_count, context_message_ids, \
         error_message, queried_at, response_time_ms FROM query_log {} \
         ORDER BY queried_at DESC, rowid DESC LIMIT ?",
        filter
    );

    let rows = sqlx::query(&sql)
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let ids_json: String = row.get("context_message_ids");
        let queried_at: i64 = row.get("queried_at");
        entries.push(QueryLogEntry {
            id: row.get("id"),
            query_text: row.get("query_text"),
            status: row.get("status"),
            candidates_fetched: row.get("candidates_fetched"),
            result_count: row.get("result_count"),
            context_message_ids: serde_json::from_str(&ids_json).unwrap_or_default(),
            error_message: row.get("error_message"),
            queried_at: DateTime::from_timestamp_millis(queried_at).unwrap_or_default(),
            response_time_ms: row.get("response_time_ms"),
        });
    }
    Ok(entries)
}

/// CLI entry point for `recall queries`.
pub async fn run_queries(
    config: &crate::config::Config,
    limit: usize,
    no_results: bool,
    json: bool,
) -> Result<()> {
    let pool = crate::db::connect(config).await?;
    let entries = list_queries(&pool, limit, no_results).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No queries logged.");
        return Ok(());
    }

    for e in &entries {
        println!(
            "{}  [{}] {} results ({} candidates, {}ms)  {}",
            e.queried_at.format("%Y-%m-%d %H:%M:%S"),
            e.status,
            e.result_count,
            e.candidates_fetched,
            e.response_time_ms,
            e.query_text
        );
        if let Some(err) = &e.error_message {
            println!("    error: {}", err);
        }
    }
    Ok(())
}
