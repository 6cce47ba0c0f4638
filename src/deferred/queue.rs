//! Durable deferred resolution queue with backoff

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DeferredQueueConfig;
use crate::database::repositories::{DeferredResolutionSeaOrmRepository, FailedAttempt};
use crate::errors::{QueueError, QueueResult, RepositoryError};
use crate::models::deferred::{DeferredEntry, DeferredStatus, EnqueueOutcome, QueueStatusCounts};
use crate::models::{CacheEntry, CompanyInfo};
use crate::normalization::NameNormalizer;
use crate::repositories::ResolutionCache;

/// Source label for cache entries backflowed by the queue
pub const DEFERRED_CACHE_SOURCE: &str = "deferred_queue";

const MAX_ERROR_LEN: usize = 500;

pub struct DeferredResolutionQueue {
    repository: DeferredResolutionSeaOrmRepository,
    cache: Arc<dyn ResolutionCache>,
    normalizer: NameNormalizer,
    backoff_schedule: Vec<Duration>,
}

impl DeferredResolutionQueue {
    pub fn new(
        repository: DeferredResolutionSeaOrmRepository,
        cache: Arc<dyn ResolutionCache>,
        normalizer: NameNormalizer,
        backoff_schedule: Vec<Duration>,
    ) -> Self {
        Self {
            repository,
            cache,
            normalizer,
            backoff_schedule,
        }
    }

    pub fn from_config(
        connection: Arc<DatabaseConnection>,
        cache: Arc<dyn ResolutionCache>,
        normalizer: NameNormalizer,
        config: &DeferredQueueConfig,
    ) -> Self {
        Self::new(
            DeferredResolutionSeaOrmRepository::new(connection),
            cache,
            normalizer,
            config.backoff_schedule.clone(),
        )
    }

    pub fn backoff_schedule(&self) -> &[Duration] {
        &self.backoff_schedule
    }

    /// Delay before the next attempt after `attempts` failures; `None` once exhausted
    pub fn next_delay(&self, attempts: u32) -> Option<Duration> {
        let index = usize::try_from(attempts).ok()?.checked_sub(1)?;
        self.backoff_schedule.get(index).copied()
    }

    pub async fn enqueue(&self, raw_name: &str, temp_id: &str) -> QueueResult<EnqueueOutcome> {
        self.enqueue_at(raw_name, temp_id, Utc::now()).await
    }

    /// Queue a name for background resolution; idempotent on the normalized name
    pub async fn enqueue_at(
        &self,
        raw_name: &str,
        temp_id: &str,
        now: DateTime<Utc>,
    ) -> QueueResult<EnqueueOutcome> {
        let normalized = self.normalizer.normalize(raw_name);
        if normalized.is_empty() {
            return Ok(EnqueueOutcome::Skipped);
        }
        let outcome = self
            .repository
            .upsert_pending(&normalized, raw_name.trim(), temp_id, now)
            .await?;
        Ok(outcome)
    }

    pub async fn get(&self, normalized_name: &str) -> QueueResult<Option<DeferredEntry>> {
        Ok(self.repository.find(normalized_name).await?)
    }

    /// Move up to `limit` due pending entries to processing
    ///
    /// Entries another worker claimed first are silently left out.
    pub async fn claim_due(&self, now: DateTime<Utc>, limit: u64) -> QueueResult<Vec<DeferredEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let due = self.repository.find_due(now, limit).await?;
        let mut claimed = Vec::with_capacity(due.len());
        for mut entry in due {
            if self
                .repository
                .transition(
                    &entry.normalized_name,
                    DeferredStatus::Pending,
                    DeferredStatus::Processing,
                    now,
                )
                .await?
            {
                entry.status = DeferredStatus::Processing;
                entry.updated_at = now;
                claimed.push(entry);
            }
        }
        if !claimed.is_empty() {
            debug!(claimed = claimed.len(), "Claimed deferred resolutions");
        }
        Ok(claimed)
    }

    /// Backflow a resolved identity into the cache, then mark the entry done
    pub async fn mark_done(&self, normalized_name: &str, info: &CompanyInfo) -> QueueResult<()> {
        self.cache
            .insert_batch(vec![CacheEntry::from_company(
                normalized_name,
                info,
                DEFERRED_CACHE_SOURCE,
            )])
            .await?;

        let moved = self
            .repository
            .transition(
                normalized_name,
                DeferredStatus::Processing,
                DeferredStatus::Done,
                Utc::now(),
            )
            .await?;
        if !moved {
            return Err(self
                .invalid_transition(normalized_name, DeferredStatus::Done)
                .await);
        }
        Ok(())
    }

    /// Count a failed attempt and either reschedule or give up
    ///
    /// Returns the entry's new status.
    pub async fn mark_failed_attempt(
        &self,
        normalized_name: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> QueueResult<DeferredStatus> {
        let entry = self.repository.find(normalized_name).await?.ok_or_else(|| {
            QueueError::Repository(RepositoryError::RecordNotFound {
                table: "deferred_resolutions".to_string(),
                field: "normalized_name".to_string(),
                value: normalized_name.to_string(),
            })
        })?;
        if entry.status != DeferredStatus::Processing {
            return Err(QueueError::InvalidTransition {
                key: normalized_name.to_string(),
                from: entry.status.to_string(),
                to: DeferredStatus::Failed.to_string(),
            });
        }

        let attempts = entry.attempts.saturating_add(1);
        let (status, next_attempt_at) = match self.next_delay(attempts) {
            Some(delay) => (
                DeferredStatus::Pending,
                now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(365)),
            ),
            None => (DeferredStatus::Failed, now),
        };

        let failure = FailedAttempt {
            attempts,
            status,
            next_attempt_at,
            error: truncate_error(error),
        };
        if !self
            .repository
            .record_failure(normalized_name, &failure, now)
            .await?
        {
            return Err(self.invalid_transition(normalized_name, status).await);
        }

        if status == DeferredStatus::Failed {
            info!(attempts, "Deferred resolution exhausted its backoff schedule");
        }
        Ok(status)
    }

    /// Return a claimed entry to pending without consuming an attempt
    pub async fn release(&self, normalized_name: &str) -> QueueResult<()> {
        let moved = self
            .repository
            .transition(
                normalized_name,
                DeferredStatus::Processing,
                DeferredStatus::Pending,
                Utc::now(),
            )
            .await?;
        if !moved {
            return Err(self
                .invalid_transition(normalized_name, DeferredStatus::Pending)
                .await);
        }
        Ok(())
    }

    /// Return entries stuck in processing for longer than `older_than`
    pub async fn recover_stale(&self, older_than: Duration) -> QueueResult<u64> {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::zero());
        let recovered = self.repository.reset_stale_processing(cutoff, now).await?;
        if recovered > 0 {
            info!(recovered, "Recovered stale deferred resolutions");
        }
        Ok(recovered)
    }

    /// Operator action: give every failed entry a fresh schedule
    pub async fn requeue_failed(&self) -> QueueResult<u64> {
        let requeued = self.repository.reset_failed(Utc::now()).await?;
        info!(requeued, "Requeued failed deferred resolutions");
        Ok(requeued)
    }

    /// Entries still awaiting resolution (pending + processing)
    pub async fn depth(&self) -> QueueResult<u64> {
        Ok(self.status_counts().await?.depth())
    }

    pub async fn status_counts(&self) -> QueueResult<QueueStatusCounts> {
        Ok(self.repository.status_counts().await?)
    }

    async fn invalid_transition(&self, normalized_name: &str, to: DeferredStatus) -> QueueError {
        let from = match self.repository.find(normalized_name).await {
            Ok(Some(entry)) => entry.status.to_string(),
            Ok(None) => "missing".to_string(),
            Err(e) => return QueueError::Repository(e),
        };
        QueueError::InvalidTransition {
            key: normalized_name.to_string(),
            from,
            to: to.to_string(),
        }
    }
}

fn truncate_error(error: &str) -> String {
    if error.chars().count() <= MAX_ERROR_LEN {
        error.to_string()
    } else {
        error.chars().take(MAX_ERROR_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MockResolutionCache;

    fn queue_with_schedule(schedule: Vec<Duration>) -> DeferredResolutionQueue {
        // the repository is never touched by these tests
        let connection = Arc::new(DatabaseConnection::Disconnected);
        DeferredResolutionQueue::new(
            DeferredResolutionSeaOrmRepository::new(connection),
            Arc::new(MockResolutionCache::new()),
            NameNormalizer::default(),
            schedule,
        )
    }

    #[test]
    fn test_next_delay_follows_schedule() {
        let queue = queue_with_schedule(vec![
            Duration::from_secs(60),
            Duration::from_secs(300),
            Duration::from_secs(900),
        ]);
        assert_eq!(queue.next_delay(0), None);
        assert_eq!(queue.next_delay(1), Some(Duration::from_secs(60)));
        assert_eq!(queue.next_delay(3), Some(Duration::from_secs(900)));
        assert_eq!(queue.next_delay(4), None);
    }

    #[test]
    fn test_empty_schedule_fails_immediately() {
        let queue = queue_with_schedule(Vec::new());
        assert_eq!(queue.next_delay(1), None);
    }

    #[test]
    fn test_error_truncation() {
        let long = "x".repeat(MAX_ERROR_LEN + 20);
        assert_eq!(truncate_error(&long).len(), MAX_ERROR_LEN);
        assert_eq!(truncate_error("timeout"), "timeout");
    }
}
