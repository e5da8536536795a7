//! SQLite-backed [`MessageStore`] and [`VectorIndex`].
//!
//! Embeddings are stored as little-endian f32 BLOBs next to the message
//! row. Nearest-neighbor search is an exact cosine scan over rows whose
//! `embedding_dims` matches the query, bounded by `db.index_timeout_secs`.
//! Timestamps are stored as Unix milliseconds.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use chat_recall_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob, DistanceMetric};
use chat_recall_core::error::IndexError;
use chat_recall_core::models::{Candidate, Message, NewMessage};
use chat_recall_core::store::{InsertOutcome, MessageStore, VectorIndex};

use crate::config::Config;
use crate::db;

const MESSAGE_COLUMNS: &str = "id, channel_id, channel_name, text, message_timestamp, \
     sender_id, sender_name, sender_username, embedding";

/// SQLite implementation of the core store traits.
pub struct SqliteStore {
    pool: SqlitePool,
    index_timeout: Duration,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, index_timeout: Duration) -> Self {
        Self {
            pool,
            index_timeout,
        }
    }

    /// Connect to the configured database.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        Ok(Self::new(
            pool,
            Duration::from_secs(config.db.index_timeout_secs),
        ))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn scan_nearest(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM messages WHERE embedding_dims = ?",
            MESSAGE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(query.len() as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut candidates: Vec<Candidate> = rows
            .iter()
            .map(|row| {
                let message = row_to_message(row);
                Candidate {
                    distance: cosine_distance(query, &message.embedding),
                    message,
                }
            })
            .collect();

        // Zero or truncated blobs give NaN distances, which sort last.
        candidates.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.message.id.cmp(&b.message.id))
        });
        candidates.truncate(k);
        Ok(candidates)
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_message(row: &SqliteRow) -> Message {
    let blob: Vec<u8> = row.get("embedding");
    Message {
        id: row.get("id"),
        channel_id: row.get("channel_id"),
        channel_name: row.get("channel_name"),
        text: row.get("text"),
        timestamp: millis_to_datetime(row.get("message_timestamp")),
        sender_id: row.get("sender_id"),
        sender_name: row.get("sender_name"),
        sender_username: row.get("sender_username"),
        embedding: blob_to_vec(&blob),
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert_message(
        &self,
        msg: &NewMessage,
        embedding: &[f32],
        model: &str,
    ) -> Result<InsertOutcome> {
        let now = Utc::now().timestamp();
        let hash = msg.dedup_hash();

        let result = sqlx::query(
            r#"
            INSERT INTO messages (channel_id, channel_name, text, message_timestamp,
                                  sender_id, sender_name, sender_username,
                                  embedding, embedding_model, embedding_dims,
                                  dedup_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(dedup_hash) DO NOTHING
            "#,
        )
        .bind(&msg.channel_id)
        .bind(&msg.channel_name)
        .bind(&msg.text)
        .bind(msg.timestamp.timestamp_millis())
        .bind(&msg.sender_id)
        .bind(&msg.sender_name)
        .bind(&msg.sender_username)
        .bind(vec_to_blob(embedding))
        .bind(model)
        .bind(embedding.len() as i64)
        .bind(&hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(InsertOutcome::Inserted(result.last_insert_rowid()));
        }

        let existing: i64 = sqlx::query_scalar("SELECT id FROM messages WHERE dedup_hash = ?")
            .bind(&hash)
            .fetch_one(&self.pool)
            .await?;
        Ok(InsertOutcome::Duplicate(existing))
    }

    async fn find_by_hash(&self, dedup_hash: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM messages WHERE dedup_hash = ?")
            .bind(dedup_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn get_message(&self, id: i64) -> Result<Option<Message>> {
        let sql = format!("SELECT {} FROM messages WHERE id = ?", MESSAGE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_message))
    }

    async fn list_messages(&self, after_id: Option<i64>, limit: usize) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE id > ? ORDER BY id ASC LIMIT ?",
            MESSAGE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(after_id.unwrap_or(0))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_message).collect())
    }

    async fn update_embedding(&self, id: i64, embedding: &[f32], model: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET embedding = ?, embedding_model = ?, embedding_dims = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(vec_to_blob(embedding))
        .bind(model)
        .bind(embedding.len() as i64)
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE message_timestamp < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE message_timestamp < ?")
                .bind(cutoff.timestamp_millis())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn count_messages(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl VectorIndex for SqliteStore {
    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Cosine
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>, IndexError> {
        match tokio::time::timeout(self.index_timeout, self.scan_nearest(query, k)).await {
            Ok(Ok(candidates)) => Ok(candidates),
            Ok(Err(e)) => Err(IndexError::Unavailable(e.to_string())),
            Err(_) => Err(IndexError::Timeout(self.index_timeout)),
        }
    }
}
