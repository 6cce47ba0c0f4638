//! Per-run enrichment statistics and unknown-company records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MatchType;

/// Tier hits broken down by the tier that produced the identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHitBreakdown {
    #[serde(rename = "override")]
    pub override_hits: u64,
    pub cache: u64,
    pub passthrough: u64,
    pub eqc: u64,
}

impl CacheHitBreakdown {
    pub fn total(&self) -> u64 {
        self.override_hits + self.cache + self.passthrough + self.eqc
    }

    pub fn get(&self, match_type: MatchType) -> u64 {
        match match_type {
            MatchType::Override => self.override_hits,
            MatchType::Cache => self.cache,
            MatchType::Passthrough => self.passthrough,
            MatchType::Eqc => self.eqc,
            MatchType::Temp => 0,
        }
    }
}

/// Snapshot of the counters gathered during one resolution run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentStats {
    pub total_lookups: u64,
    pub cache_hits: CacheHitBreakdown,
    pub temp_ids_generated: u64,
    pub api_calls: u64,
    pub sync_budget_used: u64,
    pub async_queued: u64,
    pub queue_depth_after: u64,
}

impl EnrichmentStats {
    /// Share of lookups answered without a placeholder; 0 when nothing was looked up
    pub fn cache_hit_rate(&self) -> f64 {
        if self.total_lookups == 0 {
            0.0
        } else {
            self.cache_hits.total() as f64 / self.total_lookups as f64
        }
    }

    /// Emit the single structured stats record for a run
    pub fn log_summary(&self, run_id: &str) {
        tracing::info!(
            run_id = %run_id,
            total_lookups = self.total_lookups,
            cache_hits = self.cache_hits.total(),
            override_hits = self.cache_hits.override_hits,
            cache_tier_hits = self.cache_hits.cache,
            passthrough_hits = self.cache_hits.passthrough,
            eqc_hits = self.cache_hits.eqc,
            temp_ids_generated = self.temp_ids_generated,
            api_calls = self.api_calls,
            sync_budget_used = self.sync_budget_used,
            async_queued = self.async_queued,
            queue_depth_after = self.queue_depth_after,
            cache_hit_rate = self.cache_hit_rate(),
            "Company id enrichment summary"
        );
    }
}

/// A name that ended the run with a temporary id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownCompanyRecord {
    pub company_name: String,
    pub temporary_id: String,
    pub first_seen: DateTime<Utc>,
    pub occurrence_count: u64,
}
