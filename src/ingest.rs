//! JSONL ingestion.
//!
//! Each non-empty line of the input file is one [`NewMessage`] object.
//! Messages go through the core [`Ingestor`], so nothing is stored
//! without a valid embedding and re-ingesting the same file is a no-op.
//!
//! ```json
//! {"channel_id": "-100123", "channel_name": "Dog Owners", "text": "Feed twice a day",
//!  "timestamp": "2024-12-07T09:30:15Z", "sender_username": "rex"}
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use chat_recall_core::error::IngestError;
use chat_recall_core::ingest::{IngestOutcome, Ingestor};
use chat_recall_core::models::NewMessage;

use crate::config::Config;
use crate::embedding;
use crate::sqlite_store::SqliteStore;

/// Per-file ingestion counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub stored: u64,
    pub duplicates: u64,
    /// No embedding could be produced.
    pub skipped: u64,
    /// Unparseable lines and messages failing validation.
    pub rejected: u64,
}

pub async fn ingest_file(ingestor: &Ingestor, path: &Path) -> Result<IngestSummary> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut summary = IngestSummary::default();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let msg: NewMessage = match serde_json::from_str(&line) {
            Ok(m) => m,
            Err(e) => {
                warn!(line = line_no, error = %e, "rejecting unparseable line");
                summary.rejected += 1;
                continue;
            }
        };

        match ingestor.ingest(&msg).await {
            Ok(IngestOutcome::Stored(_)) => summary.stored += 1,
            Ok(IngestOutcome::Duplicate(_)) => summary.duplicates += 1,
            Ok(IngestOutcome::Skipped(_)) => summary.skipped += 1,
            Err(IngestError::Validation(e)) => {
                warn!(line = line_no, error = %e, "rejecting invalid message");
                summary.rejected += 1;
            }
            Err(IngestError::Store(e)) => return Err(e),
        }
    }

    Ok(summary)
}

pub async fn run_ingest(config: &Config, path: &Path) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Ingestion requires embeddings. Set [embedding] provider in config.");
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let store = Arc::new(SqliteStore::open(config).await?);
    let ingestor = Ingestor::new(embedder, store.clone());

    let summary = ingest_file(&ingestor, path).await?;

    println!("ingest {}", path.display());
    println!("  stored: {}", summary.stored);
    println!("  duplicates: {}", summary.duplicates);
    println!("  skipped (no embedding): {}", summary.skipped);
    println!("  rejected: {}", summary.rejected);

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_recall_core::embedding::HashEmbedder;
    use chat_recall_core::store::memory::InMemoryStore;
    use chat_recall_core::store::MessageStore;
    use std::io::Write;

    #[tokio::test]
    async fn test_ingest_file_counts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"channel_id":"c1","text":"Feed the puppy twice a day","timestamp":"2024-12-07T09:30:15Z"}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(
            file,
            r#"{{"channel_id":"c1","text":"   ","timestamp":"2024-12-07T09:31:00Z"}}"#
        )
        .unwrap();
        writeln!(
            file,
            r#"{{"channel_id":"c1","text":"Feed the puppy twice a day","timestamp":"2024-12-07T09:30:15Z"}}"#
        )
        .unwrap();

        let store = Arc::new(InMemoryStore::new());
        let ingestor = Ingestor::new(Arc::new(HashEmbedder::new(16)), store.clone());
        let summary = ingest_file(&ingestor, file.path()).await.unwrap();

        assert_eq!(summary.stored, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.rejected, 1);
        // Blank text never reaches validation: the embedder refuses it.
        assert_eq!(summary.skipped, 1);
        assert_eq!(store.count_messages().await.unwrap(), 1);
    }
}
