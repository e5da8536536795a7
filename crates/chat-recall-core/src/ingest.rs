//! Fail-closed ingestion: a message is stored only with a valid embedding.
//!
//! The dedup hash is looked up before the embedder is called, so a
//! re-delivered message costs one store lookup and no provider request.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::embedding::{embed_text, Embedder};
use crate::error::{EmbedError, IngestError};
use crate::models::NewMessage;
use crate::store::{InsertOutcome, MessageStore};

/// What happened to one incoming message.
#[derive(Debug)]
pub enum IngestOutcome {
    Stored(i64),
    /// Already present under this id.
    Duplicate(i64),
    /// No embedding could be produced; nothing was written.
    Skipped(EmbedError),
}

/// Embeds, validates, and stores incoming messages.
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn MessageStore>,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn MessageStore>) -> Self {
        Self { embedder, store }
    }

    pub async fn ingest(&self, msg: &NewMessage) -> Result<IngestOutcome, IngestError> {
        if let Some(id) = self.store.find_by_hash(&msg.dedup_hash()).await? {
            debug!(id, channel_id = %msg.channel_id, "duplicate message; not embedding");
            return Ok(IngestOutcome::Duplicate(id));
        }

        let embedding = match embed_text(self.embedder.as_ref(), &msg.text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(channel_id = %msg.channel_id, error = %e, "skipping message without embedding");
                return Ok(IngestOutcome::Skipped(e));
            }
        };

        msg.validate(self.embedder.dims(), &embedding)?;

        let outcome = self
            .store
            .insert_message(msg, &embedding, self.embedder.model_name())
            .await?;
        debug!(?outcome, channel_id = %msg.channel_id, "stored message");

        Ok(match outcome {
            InsertOutcome::Inserted(id) => IngestOutcome::Stored(id),
            InsertOutcome::Duplicate(id) => IngestOutcome::Duplicate(id),
        })
    }
}
