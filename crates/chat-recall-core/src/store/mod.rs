//! Storage abstraction for Chat Recall.
//!
//! Two traits split the storage contract the way the retrieval path uses
//! it:
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`MessageStore`] | Create, look up, re-embed, and expire messages |
//! | [`VectorIndex`] | Answer nearest-neighbor queries over stored embeddings |
//!
//! A single backend usually implements both. Implementations must be
//! `Send + Sync`; the search path never mutates either.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::embedding::DistanceMetric;
use crate::error::IndexError;
use crate::models::{Candidate, Message, NewMessage};

/// Result of writing a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row with this id.
    Inserted(i64),
    /// A message with the same dedup hash already exists under this id.
    Duplicate(i64),
}

impl InsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            InsertOutcome::Inserted(id) | InsertOutcome::Duplicate(id) => *id,
        }
    }
}

/// Message persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a validated message together with its embedding.
    async fn insert_message(
        &self,
        msg: &NewMessage,
        embedding: &[f32],
        model: &str,
    ) -> Result<InsertOutcome>;

    /// Id of the message stored under `dedup_hash`, if any.
    async fn find_by_hash(&self, dedup_hash: &str) -> Result<Option<i64>>;

    /// Point lookup by id.
    async fn get_message(&self, id: i64) -> Result<Option<Message>>;

    /// Messages with `id > after_id` in ascending id order, at most `limit`.
    async fn list_messages(&self, after_id: Option<i64>, limit: usize) -> Result<Vec<Message>>;

    /// Replace the embedding of an existing message. Returns `false` if the
    /// id does not exist.
    async fn update_embedding(&self, id: i64, embedding: &[f32], model: &str) -> Result<bool>;

    /// Delete messages whose timestamp is strictly before `cutoff`.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Number of messages whose timestamp is strictly before `cutoff`.
    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Total number of stored messages.
    async fn count_messages(&self) -> Result<u64>;
}

/// Approximate (or exact) k-nearest-neighbor search over message embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The metric the index was built with.
    fn metric(&self) -> DistanceMetric;

    /// Up to `k` candidates ordered by ascending distance to `query`.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>, IndexError>;
}
