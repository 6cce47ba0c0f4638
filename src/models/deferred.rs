//! Deferred resolution queue entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Lifecycle of a queued name: pending -> processing -> {done | failed}
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeferredStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

/// A name waiting for background resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredEntry {
    pub normalized_name: String,
    pub raw_name: String,
    pub temp_id: String,
    pub status: DeferredStatus,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeferredEntry {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == DeferredStatus::Pending && self.next_attempt_at <= now
    }
}

/// Outcome of an enqueue call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new pending row was created
    Inserted,
    /// The name was already queued; only `last_seen` moved
    Refreshed,
    /// Nothing to queue (empty normalized name)
    Skipped,
}

/// Count of queue rows per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub done: u64,
    pub failed: u64,
}

impl QueueStatusCounts {
    /// Entries still awaiting resolution
    pub fn depth(&self) -> u64 {
        self.pending + self.processing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    #[test]
    fn test_status_strings() {
        let processing: &str = DeferredStatus::Processing.as_ref();
        assert_eq!(processing, "processing");
        assert_eq!(
            DeferredStatus::from_str("failed").unwrap(),
            DeferredStatus::Failed
        );
    }

    #[test]
    fn test_entry_due() {
        let now = Utc::now();
        let mut entry = DeferredEntry {
            normalized_name: "中国平安".into(),
            raw_name: "中国平安 ".into(),
            temp_id: "IN_AAAAAAAAAAAAAAAA".into(),
            status: DeferredStatus::Pending,
            attempts: 0,
            next_attempt_at: now - Duration::seconds(1),
            last_error: None,
            first_seen: now,
            last_seen: now,
            updated_at: now,
        };
        assert!(entry.is_due(now));
        entry.next_attempt_at = now + Duration::minutes(1);
        assert!(!entry.is_due(now));
        entry.next_attempt_at = now;
        entry.status = DeferredStatus::Processing;
        assert!(!entry.is_due(now));
    }

    #[test]
    fn test_depth_counts_open_entries() {
        let counts = QueueStatusCounts {
            pending: 3,
            processing: 1,
            done: 10,
            failed: 2,
        };
        assert_eq!(counts.depth(), 4);
    }
}
