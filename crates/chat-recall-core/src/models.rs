//! Core data models for the message corpus and the ranking pipeline.
//!
//! [`Message`] is the stored corpus unit. [`Candidate`] and
//! [`ScoredCandidate`] only live for the duration of one search call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ValidationError;

/// A stored chat message with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Store-assigned id, monotonically increasing with insertion order.
    pub id: i64,
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub sender_id: Option<String>,
    pub sender_name: Option<String>,
    pub sender_username: Option<String>,
    /// Dense vector of the store's dimension D.
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
}

/// A message as it arrives for ingestion, before embedding and id assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub channel_id: String,
    #[serde(default)]
    pub channel_name: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_username: Option<String>,
}

impl NewMessage {
    /// Check required fields and the embedding's dimension.
    pub fn validate(&self, dims: usize, embedding: &[f32]) -> Result<(), ValidationError> {
        if self.channel_id.trim().is_empty() {
            return Err(ValidationError::MissingField("channel_id"));
        }
        if self.text.trim().is_empty() {
            return Err(ValidationError::MissingField("text"));
        }
        if embedding.is_empty() {
            return Err(ValidationError::MissingField("embedding"));
        }
        if embedding.len() != dims {
            return Err(ValidationError::DimensionMismatch {
                expected: dims,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    /// SHA-256 over channel, timestamp, and text.
    ///
    /// Two deliveries of the same channel post hash identically, which lets
    /// stores treat re-ingestion as a no-op.
    pub fn dedup_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.channel_id.as_bytes());
        hasher.update(b"\x00");
        hasher.update(self.timestamp.timestamp_millis().to_le_bytes());
        hasher.update(b"\x00");
        hasher.update(self.text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Attach a store id and embedding, producing the stored form.
    pub fn into_message(self, id: i64, embedding: Vec<f32>) -> Message {
        Message {
            id,
            channel_id: self.channel_id,
            channel_name: self.channel_name,
            text: self.text,
            timestamp: self.timestamp,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            sender_username: self.sender_username,
            embedding,
        }
    }
}

/// A nearest-neighbor hit: a message and its cosine distance to the query.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub message: Message,
    /// Cosine distance in `[0, 2]`; `0` is identical direction.
    pub distance: f64,
}

/// Per-signal breakdown of a candidate's combined score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub semantic: f64,
    pub keyword: f64,
    pub exact_phrase: f64,
    pub long_text: f64,
    pub partial: f64,
    pub combined: f64,
}

/// A candidate after rescoring.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub message: Message,
    pub distance: f64,
    pub score: ScoreBreakdown,
}
