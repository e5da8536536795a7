//! Age-based retention of stored messages.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::store::MessageStore;

/// Default retention horizon.
pub const DEFAULT_MAX_AGE_DAYS: u32 = 90;

/// Messages with a timestamp strictly before this instant are expired.
pub fn retention_cutoff(now: DateTime<Utc>, max_age_days: u32) -> DateTime<Utc> {
    now - Duration::days(i64::from(max_age_days))
}

/// Delete expired messages, returning how many were removed.
pub async fn prune(store: &dyn MessageStore, now: DateTime<Utc>, max_age_days: u32) -> Result<u64> {
    let cutoff = retention_cutoff(now, max_age_days);
    let deleted = store.delete_older_than(cutoff).await?;
    info!(deleted, cutoff = %cutoff, "pruned expired messages");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewMessage;
    use crate::store::memory::InMemoryStore;
    use chrono::TimeZone;

    #[test]
    fn test_cutoff() {
        let now = Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap();
        let cutoff = retention_cutoff(now, 90);
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2024, 12, 31, 12, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_prune_keeps_boundary_message() {
        let now = Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap();
        let store = InMemoryStore::new();
        for (text, ts) in [
            ("expired", retention_cutoff(now, 90) - Duration::seconds(1)),
            ("boundary", retention_cutoff(now, 90)),
            ("fresh", now),
        ] {
            let msg = NewMessage {
                channel_id: "c".to_string(),
                channel_name: None,
                text: text.to_string(),
                timestamp: ts,
                sender_id: None,
                sender_name: None,
                sender_username: None,
            };
            store.insert_message(&msg, &[1.0], "m").await.unwrap();
        }

        assert_eq!(prune(&store, now, 90).await.unwrap(), 1);
        let left: Vec<String> = store
            .list_messages(None, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(left, vec!["boundary", "fresh"]);
    }
}
