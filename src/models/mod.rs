//! Domain models for company identity resolution
//!
//! These are the values that flow between the tiers: the per-row request, the
//! resolved `CompanyInfo`, the per-run `ResolutionStrategy`, and the persisted
//! `CacheEntry`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{AsRefStr, Display, EnumString};

use crate::config::{ColumnMappingConfig, Config};

pub mod deferred;
pub mod enrichment;

pub use deferred::{DeferredEntry, DeferredStatus};
pub use enrichment::{CacheHitBreakdown, EnrichmentStats, UnknownCompanyRecord};

/// Prefix carried by every temporary identifier
pub const TEMP_ID_PREFIX: &str = "IN_";

/// Which tier produced an identifier
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchType {
    Override,
    Cache,
    Passthrough,
    Eqc,
    Temp,
}

impl MatchType {
    /// Default confidence attached to results from this tier
    pub fn default_confidence(self) -> f64 {
        match self {
            MatchType::Override => 1.0,
            MatchType::Cache => 0.9,
            MatchType::Passthrough => 0.8,
            MatchType::Eqc => 0.9,
            MatchType::Temp => 0.0,
        }
    }
}

/// A resolved company identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub company_id: String,
    pub official_name: String,
    pub unified_credit_code: Option<String>,
    pub confidence: f64,
    pub match_type: MatchType,
}

impl CompanyInfo {
    pub fn new(
        company_id: impl Into<String>,
        official_name: impl Into<String>,
        confidence: f64,
        match_type: MatchType,
    ) -> Self {
        Self {
            company_id: company_id.into(),
            official_name: official_name.into(),
            unified_credit_code: None,
            confidence: clamp_confidence(confidence),
            match_type,
        }
    }

    pub fn with_credit_code(mut self, code: Option<String>) -> Self {
        self.unified_credit_code = code;
        self
    }
}

/// Confidence is always kept inside `[0, 1]`; NaN becomes 0
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// True for identifiers minted by the temporary id generator
pub fn is_temporary_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Per-row inputs extracted from a data row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub plan_code: Option<String>,
    pub customer_name: Option<String>,
    pub account_name: Option<String>,
    pub existing_company_id: Option<String>,
}

impl ResolutionRequest {
    /// Names to try against the cache, in priority order
    pub fn candidate_names(&self) -> impl Iterator<Item = &str> {
        self.customer_name
            .as_deref()
            .into_iter()
            .chain(self.account_name.as_deref())
    }

    /// The name used for temp ids, queueing and the unknown-company export
    pub fn primary_name(&self) -> Option<&str> {
        self.customer_name
            .as_deref()
            .or(self.account_name.as_deref())
    }
}

/// Row-level configuration for one resolution run. Read-only once built.
#[derive(Debug, Clone)]
pub struct ResolutionStrategy {
    pub columns: ColumnMappingConfig,
    pub output_column: String,
    pub enable_external_lookup: bool,
    pub sync_budget: u32,
    pub allow_temp_ids: bool,
    /// Stop starting external calls once this much time has passed
    pub batch_timeout: Option<Duration>,
}

impl Default for ResolutionStrategy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ResolutionStrategy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            columns: config.resolution.columns.clone(),
            output_column: config.resolution.output_column.clone(),
            enable_external_lookup: config.eqc.enabled && config.eqc.sync_budget > 0,
            sync_budget: config.eqc.sync_budget,
            allow_temp_ids: config.resolution.allow_temp_ids,
            batch_timeout: config.resolution.batch_timeout,
        }
    }

    pub fn with_sync_budget(mut self, budget: u32) -> Self {
        self.sync_budget = budget;
        self.enable_external_lookup = budget > 0;
        self
    }

    /// Effective budget for the external tier in this run
    pub fn external_budget(&self) -> u32 {
        if self.enable_external_lookup {
            self.sync_budget
        } else {
            0
        }
    }
}

/// Persisted mapping from a normalized name to a company identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub normalized_name: String,
    pub company_id: String,
    pub match_type: MatchType,
    pub confidence: f64,
    pub source: String,
}

impl CacheEntry {
    pub fn new(
        normalized_name: impl Into<String>,
        company_id: impl Into<String>,
        match_type: MatchType,
        confidence: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            normalized_name: normalized_name.into(),
            company_id: company_id.into(),
            match_type,
            confidence: clamp_confidence(confidence),
            source: source.into(),
        }
    }

    /// Cache entry for an already-normalized key and a resolved identity
    pub fn from_company(normalized_name: impl Into<String>, info: &CompanyInfo, source: &str) -> Self {
        Self::new(
            normalized_name,
            info.company_id.clone(),
            info.match_type,
            info.confidence,
            source,
        )
    }

    pub fn to_company_info(&self) -> CompanyInfo {
        CompanyInfo::new(
            self.company_id.clone(),
            self.normalized_name.clone(),
            self.confidence,
            MatchType::Cache,
        )
    }
}
