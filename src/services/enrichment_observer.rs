//! Per-run enrichment counters and unknown-company tracking
//!
//! Counters are atomics so row partitions may record concurrently. Company names
//! are held only for the unknown-company export and never appear in the
//! aggregate stats.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::models::{CacheHitBreakdown, EnrichmentStats, MatchType, UnknownCompanyRecord};
use crate::observability::{ResolverMetrics, metrics};

#[derive(Debug)]
struct UnknownSlot {
    record: UnknownCompanyRecord,
    sequence: u64,
}

pub struct EnrichmentObserver {
    total_lookups: AtomicU64,
    override_hits: AtomicU64,
    cache_hits: AtomicU64,
    passthrough_hits: AtomicU64,
    eqc_hits: AtomicU64,
    temp_ids_generated: AtomicU64,
    api_calls: AtomicU64,
    sync_budget_used: AtomicU64,
    async_queued: AtomicU64,
    queue_depth_after: AtomicU64,
    // keyed by temporary id: spellings that share an id share one record
    unknown: Mutex<HashMap<String, UnknownSlot>>,
    sequence: AtomicU64,
    metrics: &'static ResolverMetrics,
}

impl Default for EnrichmentObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnrichmentObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentObserver")
            .field("stats", &self.get_stats())
            .finish()
    }
}

impl EnrichmentObserver {
    pub fn new() -> Self {
        Self {
            total_lookups: AtomicU64::new(0),
            override_hits: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            passthrough_hits: AtomicU64::new(0),
            eqc_hits: AtomicU64::new(0),
            temp_ids_generated: AtomicU64::new(0),
            api_calls: AtomicU64::new(0),
            sync_budget_used: AtomicU64::new(0),
            async_queued: AtomicU64::new(0),
            queue_depth_after: AtomicU64::new(0),
            unknown: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            metrics: metrics(),
        }
    }

    pub fn record_lookup(&self) {
        self.total_lookups.fetch_add(1, Ordering::Relaxed);
        self.metrics.lookups.add(1, &[]);
    }

    /// Count a row resolved by an authoritative tier
    pub fn record_cache_hit(&self, match_type: MatchType) {
        let counter = match match_type {
            MatchType::Override => &self.override_hits,
            MatchType::Cache => &self.cache_hits,
            MatchType::Passthrough => &self.passthrough_hits,
            MatchType::Eqc => &self.eqc_hits,
            MatchType::Temp => {
                debug!("Temporary ids are not tier hits; use record_temp_id");
                return;
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_tier_hit(match_type);
    }

    /// Count a temporary id assignment; blank names are counted but not tracked
    pub fn record_temp_id(&self, company_name: &str, temporary_id: &str) {
        self.temp_ids_generated.fetch_add(1, Ordering::Relaxed);
        self.metrics.temp_ids.add(1, &[]);

        let company_name = company_name.trim();
        if company_name.is_empty() {
            return;
        }

        let mut unknown = self.unknown();
        unknown
            .entry(temporary_id.to_string())
            .and_modify(|slot| slot.record.occurrence_count += 1)
            .or_insert_with(|| UnknownSlot {
                record: UnknownCompanyRecord {
                    company_name: company_name.to_string(),
                    temporary_id: temporary_id.to_string(),
                    first_seen: Utc::now(),
                    occurrence_count: 1,
                },
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            });
    }

    pub fn record_api_call(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        self.metrics.api_calls.add(1, &[]);
    }

    pub fn set_sync_budget_used(&self, used: u64) {
        self.sync_budget_used.store(used, Ordering::Relaxed);
    }

    pub fn record_async_queued(&self) {
        self.async_queued.fetch_add(1, Ordering::Relaxed);
        self.metrics.async_queued.add(1, &[]);
    }

    pub fn set_queue_depth(&self, depth: u64) {
        self.queue_depth_after.store(depth, Ordering::Relaxed);
        self.metrics.queue_depth.record(depth, &[]);
    }

    pub fn get_stats(&self) -> EnrichmentStats {
        EnrichmentStats {
            total_lookups: self.total_lookups.load(Ordering::Relaxed),
            cache_hits: CacheHitBreakdown {
                override_hits: self.override_hits.load(Ordering::Relaxed),
                cache: self.cache_hits.load(Ordering::Relaxed),
                passthrough: self.passthrough_hits.load(Ordering::Relaxed),
                eqc: self.eqc_hits.load(Ordering::Relaxed),
            },
            temp_ids_generated: self.temp_ids_generated.load(Ordering::Relaxed),
            api_calls: self.api_calls.load(Ordering::Relaxed),
            sync_budget_used: self.sync_budget_used.load(Ordering::Relaxed),
            async_queued: self.async_queued.load(Ordering::Relaxed),
            queue_depth_after: self.queue_depth_after.load(Ordering::Relaxed),
        }
    }

    /// Unknown companies, most frequent first; ties keep first-seen order
    pub fn get_unknown_companies(&self) -> Vec<UnknownCompanyRecord> {
        let unknown = self.unknown();
        let mut slots: Vec<(&UnknownCompanyRecord, u64, DateTime<Utc>)> = unknown
            .values()
            .map(|slot| (&slot.record, slot.sequence, slot.record.first_seen))
            .collect();
        slots.sort_by(|a, b| {
            b.0.occurrence_count
                .cmp(&a.0.occurrence_count)
                .then(a.2.cmp(&b.2))
                .then(a.1.cmp(&b.1))
        });
        slots.into_iter().map(|(record, _, _)| record.clone()).collect()
    }

    fn unknown(&self) -> MutexGuard<'_, HashMap<String, UnknownSlot>> {
        self.unknown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
