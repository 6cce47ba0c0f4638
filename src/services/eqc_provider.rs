//! Budgeted, timeout-bounded client for the EQC company search service
//!
//! An instance starts `Enabled` and moves to `Disabled` on the first 401; it
//! never comes back. Each lookup that reaches the network consumes exactly one
//! unit of budget, whatever the outcome. Successful results are written
//! through to the resolution cache on a best-effort basis.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use strum::Display;
use tracing::{debug, warn};

use crate::config::EqcConfig;
use crate::errors::LookupError;
use crate::models::{CacheEntry, CompanyInfo};
use crate::normalization::NameNormalizer;
use crate::repositories::ResolutionCache;
use crate::sources::{EqcSearchResponse, EqcTransport, TransportError, TransportResponse};

/// Source label stored with write-through cache entries
pub const EQC_CACHE_SOURCE: &str = "eqc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProviderState {
    Enabled,
    Disabled,
}

/// Why a lookup returned without touching the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    NoCredential,
    BudgetExhausted,
    EmptyName,
}

/// Detailed result of one lookup
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(CompanyInfo),
    NotFound,
    /// No request was sent and no budget was consumed
    Skipped(SkipReason),
    /// A request was sent (budget consumed) but produced no result
    Failed(LookupError),
}

impl LookupOutcome {
    pub fn into_company(self) -> Option<CompanyInfo> {
        match self {
            LookupOutcome::Found(info) => Some(info),
            _ => None,
        }
    }

    /// Whether this outcome consumed budget
    pub fn issued_call(&self) -> bool {
        !matches!(self, LookupOutcome::Skipped(_))
    }
}

#[derive(Debug, Default)]
struct ProviderCounters {
    calls_issued: AtomicU64,
    successes: AtomicU64,
    not_found: AtomicU64,
    auth_failures: AtomicU64,
    other_failures: AtomicU64,
    cache_write_failures: AtomicU64,
}

/// Snapshot of provider counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProviderStats {
    pub calls_issued: u64,
    pub successes: u64,
    pub not_found: u64,
    pub auth_failures: u64,
    pub other_failures: u64,
    pub cache_write_failures: u64,
}

pub struct EqcProvider {
    transport: Arc<dyn EqcTransport>,
    cache: Option<Arc<dyn ResolutionCache>>,
    normalizer: NameNormalizer,
    token: Option<String>,
    timeout: Duration,
    max_attempts: u32,
    disabled: AtomicBool,
    remaining_budget: AtomicU32,
    counters: ProviderCounters,
}

impl std::fmt::Debug for EqcProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EqcProvider")
            .field("state", &self.state())
            .field("remaining_budget", &self.remaining_budget())
            .field("has_credential", &self.token.is_some())
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl EqcProvider {
    pub fn new(
        transport: Arc<dyn EqcTransport>,
        token: Option<String>,
        budget: u32,
        normalizer: NameNormalizer,
    ) -> Self {
        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if token.is_none() {
            warn!("No EQC credential configured; external lookups are disabled");
        }
        Self {
            transport,
            cache: None,
            normalizer,
            token,
            timeout: Duration::from_secs(5),
            max_attempts: 2,
            disabled: AtomicBool::new(false),
            remaining_budget: AtomicU32::new(budget),
            counters: ProviderCounters::default(),
        }
    }

    /// Build from configuration; `enabled = false` yields a disabled instance
    pub fn from_config(
        config: &EqcConfig,
        transport: Arc<dyn EqcTransport>,
        normalizer: NameNormalizer,
    ) -> Self {
        let provider = Self::new(
            transport,
            config.credential().map(str::to_string),
            config.sync_budget,
            normalizer,
        )
        .with_timeout(config.timeout)
        .with_max_attempts(config.max_attempts);
        if !config.enabled {
            provider.disabled.store(true, Ordering::SeqCst);
        }
        provider
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResolutionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn state(&self) -> ProviderState {
        if self.disabled.load(Ordering::SeqCst) {
            ProviderState::Disabled
        } else {
            ProviderState::Enabled
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.state() == ProviderState::Disabled
    }

    pub fn remaining_budget(&self) -> u32 {
        self.remaining_budget.load(Ordering::SeqCst)
    }

    /// Replace the remaining budget; a disabled instance stays disabled
    pub fn reset_budget(&self, budget: u32) {
        self.remaining_budget.store(budget, Ordering::SeqCst);
    }

    /// Whether the next lookup could reach the network
    pub fn is_available(&self) -> bool {
        !self.is_disabled() && self.token.is_some() && self.remaining_budget() > 0
    }

    pub fn stats(&self) -> ProviderStats {
        let c = &self.counters;
        ProviderStats {
            calls_issued: c.calls_issued.load(Ordering::Relaxed),
            successes: c.successes.load(Ordering::Relaxed),
            not_found: c.not_found.load(Ordering::Relaxed),
            auth_failures: c.auth_failures.load(Ordering::Relaxed),
            other_failures: c.other_failures.load(Ordering::Relaxed),
            cache_write_failures: c.cache_write_failures.load(Ordering::Relaxed),
        }
    }

    /// Look up a company by name; `None` covers every miss and failure
    pub async fn lookup(&self, company_name: &str) -> Option<CompanyInfo> {
        self.lookup_detailed(company_name).await.into_company()
    }

    pub async fn lookup_detailed(&self, company_name: &str) -> LookupOutcome {
        if self.is_disabled() {
            return LookupOutcome::Skipped(SkipReason::Disabled);
        }
        let Some(token) = self.token.as_deref() else {
            return LookupOutcome::Skipped(SkipReason::NoCredential);
        };
        let query = company_name.trim();
        let normalized = self.normalizer.normalize(query);
        if normalized.is_empty() {
            return LookupOutcome::Skipped(SkipReason::EmptyName);
        }
        if !self.try_consume_budget() {
            return LookupOutcome::Skipped(SkipReason::BudgetExhausted);
        }
        self.counters.calls_issued.fetch_add(1, Ordering::Relaxed);

        let response = match self.send_with_retry(query, token).await {
            Ok(response) => response,
            Err(e) => {
                self.counters.other_failures.fetch_add(1, Ordering::Relaxed);
                let error = e.into_lookup_error(self.timeout);
                warn!(error = %error, "EQC lookup failed");
                return LookupOutcome::Failed(error);
            }
        };

        match response.status {
            200 => match EqcSearchResponse::parse(&response.body) {
                Ok(parsed) => {
                    self.counters.successes.fetch_add(1, Ordering::Relaxed);
                    let info = parsed.into_company_info();
                    self.write_through(&normalized, &info).await;
                    LookupOutcome::Found(info)
                }
                Err(e) => {
                    self.counters.other_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "EQC returned an unreadable response body");
                    LookupOutcome::Failed(e)
                }
            },
            404 => {
                self.counters.not_found.fetch_add(1, Ordering::Relaxed);
                LookupOutcome::NotFound
            }
            401 => {
                self.counters.auth_failures.fetch_add(1, Ordering::Relaxed);
                if !self.disabled.swap(true, Ordering::SeqCst) {
                    warn!(
                        status = 401,
                        "EQC rejected the credential; external lookups disabled for this process"
                    );
                }
                LookupOutcome::Failed(LookupError::AuthenticationFailed { status: 401 })
            }
            429 => {
                self.counters.other_failures.fetch_add(1, Ordering::Relaxed);
                warn!(status = 429, "EQC rate limited the lookup");
                LookupOutcome::Failed(LookupError::RateLimited)
            }
            status => {
                self.counters.other_failures.fetch_add(1, Ordering::Relaxed);
                if status >= 500 {
                    warn!(status, "EQC upstream error");
                } else {
                    warn!(status, "EQC returned an unexpected status");
                }
                LookupOutcome::Failed(LookupError::Http { status })
            }
        }
    }

    fn try_consume_budget(&self) -> bool {
        self.remaining_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(1))
            .is_ok()
    }

    /// Send one request, repeating only on timeout or connection failures
    async fn send_with_retry(
        &self,
        query: &str,
        token: &str,
    ) -> Result<TransportResponse, TransportError> {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, self.transport.search(query, token))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    debug!(attempt, error = %e, "Retrying EQC lookup");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn write_through(&self, normalized: &str, info: &CompanyInfo) {
        let Some(cache) = &self.cache else {
            return;
        };
        let entry = CacheEntry::from_company(normalized, info, EQC_CACHE_SOURCE);
        if let Err(e) = cache.insert_batch(vec![entry]).await {
            self.counters
                .cache_write_failures
                .fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "Failed to write EQC result through to the cache");
        }
    }
}
