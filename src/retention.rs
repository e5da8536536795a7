//! `recall prune`: drop messages older than `[retention].max_age_days`.

use anyhow::Result;
use chrono::Utc;

use chat_recall_core::retention::{prune, retention_cutoff};
use chat_recall_core::store::MessageStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn run_prune(config: &Config, dry_run: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let now = Utc::now();
    let days = config.retention.max_age_days;
    let cutoff = retention_cutoff(now, days);

    if dry_run {
        let expired = store.count_older_than(cutoff).await?;
        println!("prune (dry-run)");
        println!("  cutoff: {}", cutoff.to_rfc3339());
        println!("  messages to delete: {}", expired);
        store.pool().close().await;
        return Ok(());
    }

    let deleted = prune(&store, now, days).await?;
    let remaining = store.count_messages().await?;
    store.pool().close().await;

    println!("prune");
    println!("  cutoff: {}", cutoff.to_rfc3339());
    println!("  deleted: {}", deleted);
    println!("  remaining: {}", remaining);
    Ok(())
}
