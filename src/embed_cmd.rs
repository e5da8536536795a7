//! `recall embed rebuild`: re-embed every stored message with the
//! configured provider.
//!
//! Used after switching models or dimensions. A message whose new
//! embedding fails keeps its old vector, so the store never holds a row
//! without one.

use anyhow::{bail, Result};
use tracing::warn;

use chat_recall_core::embedding::{embed_text, Embedder};
use chat_recall_core::store::MessageStore;

use crate::config::Config;
use crate::embedding;
use crate::sqlite_store::SqliteStore;

const PAGE_SIZE: usize = 100;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RebuildSummary {
    pub total: u64,
    pub embedded: u64,
    pub failed: u64,
    /// Deleted between listing and update.
    pub skipped: u64,
}

pub async fn rebuild_embeddings(
    store: &dyn MessageStore,
    embedder: &dyn Embedder,
) -> Result<RebuildSummary> {
    let mut summary = RebuildSummary::default();
    let mut after_id = None;

    loop {
        let page = store.list_messages(after_id, PAGE_SIZE).await?;
        let Some(last) = page.last() else {
            break;
        };
        after_id = Some(last.id);

        for msg in &page {
            summary.total += 1;
            match embed_text(embedder, &msg.text).await {
                Ok(vector) => {
                    if store
                        .update_embedding(msg.id, &vector, embedder.model_name())
                        .await?
                    {
                        summary.embedded += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
                Err(e) => {
                    warn!(id = msg.id, error = %e, "keeping previous embedding");
                    summary.failed += 1;
                }
            }
        }
    }

    Ok(summary)
}

pub async fn run_embed_rebuild(config: &Config) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let store = SqliteStore::open(config).await?;
    let summary = rebuild_embeddings(&store, embedder.as_ref()).await;
    store.pool().close().await;
    let summary = summary?;

    println!("embed rebuild ({})", embedder.model_name());
    println!("  total messages: {}", summary.total);
    println!("  embedded: {}", summary.embedded);
    println!("  failed: {}", summary.failed);
    println!("  skipped: {}", summary.skipped);
    Ok(())
}
