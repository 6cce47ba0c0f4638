//! Background worker draining the deferred resolution queue

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::queue::DeferredResolutionQueue;
use crate::config::DeferredQueueConfig;
use crate::errors::{LookupError, QueueResult};
use crate::models::DeferredStatus;
use crate::services::eqc_provider::{EqcProvider, LookupOutcome};
use crate::utils::jitter::jittered_interval;

const POLL_JITTER_PERCENT: u8 = 10;

/// What one pass over the queue did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub claimed: u64,
    pub resolved: u64,
    pub retry_scheduled: u64,
    pub failed: u64,
    /// Returned to pending without an attempt (provider unavailable)
    pub released: u64,
}

pub struct DeferredResolutionWorker {
    queue: Arc<DeferredResolutionQueue>,
    provider: Arc<EqcProvider>,
    poll_interval: Duration,
    claim_batch_size: u64,
    budget_per_pass: u32,
    stale_after: Duration,
}

impl DeferredResolutionWorker {
    pub fn new(
        queue: Arc<DeferredResolutionQueue>,
        provider: Arc<EqcProvider>,
        config: &DeferredQueueConfig,
    ) -> Self {
        Self {
            queue,
            provider,
            poll_interval: config.poll_interval,
            claim_batch_size: config.claim_batch_size,
            budget_per_pass: config.worker_budget_per_pass,
            stale_after: config.stale_after,
        }
    }

    /// Poll the queue until the token is cancelled
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        info!(
            "Starting deferred resolution worker (poll interval: {:?}, budget per pass: {})",
            self.poll_interval, self.budget_per_pass
        );

        let mut warned_disabled = false;
        loop {
            match self.process_due().await {
                Ok(summary) if summary.claimed > 0 => debug!(?summary, "Deferred pass complete"),
                Ok(_) => {}
                Err(e) => error!("Error processing deferred resolutions: {}", e),
            }

            if self.provider.is_disabled() && !warned_disabled {
                warn!("External lookups are disabled; deferred worker will only recover stale entries");
                warned_disabled = true;
            }

            tokio::select! {
                _ = tokio::time::sleep(jittered_interval(self.poll_interval, POLL_JITTER_PERCENT)) => {}
                _ = cancellation_token.cancelled() => {
                    info!("Deferred resolution worker received cancellation signal");
                    break;
                }
            }
        }

        info!("Deferred resolution worker stopped");
        Ok(())
    }

    /// One pass: replenish budget, recover stale claims, resolve due entries
    pub async fn process_due(&self) -> QueueResult<PassSummary> {
        let mut summary = PassSummary::default();

        self.queue.recover_stale(self.stale_after).await?;
        self.provider.reset_budget(self.budget_per_pass);
        if !self.provider.is_available() {
            return Ok(summary);
        }

        let limit = self.claim_batch_size.min(u64::from(self.budget_per_pass));
        let claimed = self.queue.claim_due(Utc::now(), limit).await?;
        summary.claimed = claimed.len() as u64;

        for entry in claimed {
            let key = entry.normalized_name.as_str();

            if !self.provider.is_available() {
                self.queue.release(key).await?;
                summary.released += 1;
                continue;
            }

            let failure = match self.provider.lookup_detailed(&entry.raw_name).await {
                LookupOutcome::Found(info) => match self.queue.mark_done(key, &info).await {
                    Ok(()) => {
                        summary.resolved += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to record deferred resolution; releasing entry");
                        match self.queue.release(key).await {
                            Ok(()) => summary.released += 1,
                            Err(e) => warn!(error = %e, "Failed to release deferred entry"),
                        }
                        continue;
                    }
                },
                LookupOutcome::Skipped(reason) => {
                    debug!(%reason, "Deferred lookup skipped");
                    self.queue.release(key).await?;
                    summary.released += 1;
                    continue;
                }
                LookupOutcome::Failed(e @ LookupError::AuthenticationFailed { .. }) => {
                    // a rejected credential says nothing about the name
                    warn!(error = %e, "Deferred lookup rejected; releasing entry");
                    self.queue.release(key).await?;
                    summary.released += 1;
                    continue;
                }
                LookupOutcome::NotFound => "not found".to_string(),
                LookupOutcome::Failed(e) => e.to_string(),
            };

            match self
                .queue
                .mark_failed_attempt(key, &failure, Utc::now())
                .await?
            {
                DeferredStatus::Failed => summary.failed += 1,
                _ => summary.retry_scheduled += 1,
            }
        }

        if summary.claimed > 0 {
            info!(
                claimed = summary.claimed,
                resolved = summary.resolved,
                retry_scheduled = summary.retry_scheduled,
                failed = summary.failed,
                released = summary.released,
                "Deferred resolution pass finished"
            );
        }
        Ok(summary)
    }
}
