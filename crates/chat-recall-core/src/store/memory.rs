//! In-memory [`MessageStore`] + [`VectorIndex`] for tests.
//!
//! Messages live in a `Vec` behind `std::sync::RwLock`. Nearest-neighbor
//! search is an exact brute-force scan.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::embedding::DistanceMetric;
use crate::error::IndexError;
use crate::models::{Candidate, Message, NewMessage};

use super::{InsertOutcome, MessageStore, VectorIndex};

struct StoredMessage {
    message: Message,
    _model: String,
}

#[derive(Default)]
struct Inner {
    messages: Vec<StoredMessage>,
    by_hash: HashMap<String, i64>,
    next_id: i64,
}

/// In-memory store for tests and embedding into other processes.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    metric: DistanceMetric,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_metric(DistanceMetric::Cosine)
    }

    /// A store whose index reports (and ranks by) `metric`.
    pub fn with_metric(metric: DistanceMetric) -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_id: 1,
                ..Inner::default()
            }),
            metric,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn insert_message(
        &self,
        msg: &NewMessage,
        embedding: &[f32],
        model: &str,
    ) -> Result<InsertOutcome> {
        let hash = msg.dedup_hash();
        let mut inner = self.write()?;
        if let Some(&existing) = inner.by_hash.get(&hash) {
            return Ok(InsertOutcome::Duplicate(existing));
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.by_hash.insert(hash, id);
        inner.messages.push(StoredMessage {
            message: msg.clone().into_message(id, embedding.to_vec()),
            _model: model.to_string(),
        });
        Ok(InsertOutcome::Inserted(id))
    }

    async fn find_by_hash(&self, dedup_hash: &str) -> Result<Option<i64>> {
        Ok(self.read()?.by_hash.get(dedup_hash).copied())
    }

    async fn get_message(&self, id: i64) -> Result<Option<Message>> {
        let inner = self.read()?;
        Ok(inner
            .messages
            .iter()
            .find(|sm| sm.message.id == id)
            .map(|sm| sm.message.clone()))
    }

    async fn list_messages(&self, after_id: Option<i64>, limit: usize) -> Result<Vec<Message>> {
        let inner = self.read()?;
        let floor = after_id.unwrap_or(i64::MIN);
        // Ids are assigned in push order, so the Vec is already id-sorted.
        Ok(inner
            .messages
            .iter()
            .filter(|sm| sm.message.id > floor)
            .take(limit)
            .map(|sm| sm.message.clone())
            .collect())
    }

    async fn update_embedding(&self, id: i64, embedding: &[f32], model: &str) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.messages.iter_mut().find(|sm| sm.message.id == id) {
            Some(sm) => {
                sm.message.embedding = embedding.to_vec();
                sm._model = model.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.write()?;
        let before = inner.messages.len();
        inner.messages.retain(|sm| sm.message.timestamp >= cutoff);
        let live: std::collections::HashSet<i64> =
            inner.messages.iter().map(|sm| sm.message.id).collect();
        inner.by_hash.retain(|_, id| live.contains(id));
        Ok((before - inner.messages.len()) as u64)
    }

    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner
            .messages
            .iter()
            .filter(|sm| sm.message.timestamp < cutoff)
            .count() as u64)
    }

    async fn count_messages(&self) -> Result<u64> {
        Ok(self.read()?.messages.len() as u64)
    }
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>, IndexError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| IndexError::Unavailable("in-memory store lock poisoned".to_string()))?;

        let mut candidates: Vec<Candidate> = inner
            .messages
            .iter()
            .filter(|sm| sm.message.embedding.len() == query.len())
            .map(|sm| Candidate {
                distance: self.metric.distance(query, &sm.message.embedding),
                message: sm.message.clone(),
            })
            .collect();

        // NaN distances sort last.
        candidates.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.message.id.cmp(&b.message.id))
        });
        candidates.truncate(k);
        Ok(candidates)
    }
}
