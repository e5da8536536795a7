//! Message retrieval by id.
//!
//! Used by both the `recall get` CLI command and `GET /messages/{id}`.

use anyhow::Result;
use serde::Serialize;

use chat_recall_core::models::Message;
use chat_recall_core::store::MessageStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Stored message as returned to callers, without its vector.
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub id: i64,
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub text: String,
    pub timestamp: String, // ISO8601
    pub sender_id: Option<String>,
    pub sender_name: Option<String>,
    pub sender_username: Option<String>,
    pub embedding_dims: usize,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            embedding_dims: m.embedding.len(),
            id: m.id,
            channel_id: m.channel_id,
            channel_name: m.channel_name,
            text: m.text,
            timestamp: m.timestamp.to_rfc3339(),
            sender_id: m.sender_id,
            sender_name: m.sender_name,
            sender_username: m.sender_username,
        }
    }
}

pub async fn get_message(store: &SqliteStore, id: i64) -> Result<Option<MessageResponse>> {
    Ok(store.get_message(id).await?.map(MessageResponse::from))
}

pub async fn run_get(config: &Config, id: i64) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let found = get_message(&store, id).await;
    store.pool().close().await;

    let msg = match found? {
        Some(m) => m,
        None => anyhow::bail!("message not found: {}", id),
    };

    println!("--- message {} ---", msg.id);
    println!(
        "channel: {}{}",
        msg.channel_id,
        msg.channel_name
            .as_deref()
            .map(|n| format!(" ({})", n))
            .unwrap_or_default()
    );
    if let Some(sender) = msg.sender_username.as_deref().or(msg.sender_name.as_deref()) {
        println!("sender: {}", sender);
    }
    println!("timestamp: {}", msg.timestamp);
    println!("embedding dims: {}", msg.embedding_dims);
    println!();
    println!("{}", msg.text);

    Ok(())
}
