//! Tiered company id resolution over a batch of rows
//!
//! Tier order per row is fixed: override, cache, passthrough, external lookup,
//! then the temporary-id fallback. Failures inside a tier degrade to the next
//! tier. The only errors a caller sees are the ones that would leave a row
//! without an identifier.

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use super::eqc_provider::{EqcProvider, LookupOutcome};
use super::enrichment_observer::EnrichmentObserver;
use super::override_table::OverrideTable;
use super::unknown_company_export::UnknownCompanyExporter;
use crate::config::ColumnMappingConfig;
use crate::deferred::DeferredResolutionQueue;
use crate::errors::{ResolutionError, ResolutionResult};
use crate::models::deferred::EnqueueOutcome;
use crate::models::{
    CacheEntry, CompanyInfo, EnrichmentStats, MatchType, ResolutionRequest, ResolutionStrategy,
    is_temporary_id,
};
use crate::normalization::NameNormalizer;
use crate::repositories::ResolutionCache;
use crate::utils::TemporaryIdGenerator;

/// Source label for cache entries backflowed from the passthrough tier
pub const PASSTHROUGH_CACHE_SOURCE: &str = "passthrough";

/// One input or output row
pub type DataRow = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct ResolutionOutput {
    pub run_id: String,
    pub rows: Vec<DataRow>,
    pub stats: EnrichmentStats,
    pub export_path: Option<PathBuf>,
}

/// Per-row working state for one run
struct BatchState {
    requests: Vec<ResolutionRequest>,
    /// normalized customer name, then normalized account name
    candidate_keys: Vec<Vec<String>>,
    /// normalized primary name; empty when the row has none
    primary_keys: Vec<String>,
    resolved: Vec<Option<CompanyInfo>>,
}

impl BatchState {
    fn unresolved(&self) -> impl Iterator<Item = usize> + '_ {
        self.resolved
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_none())
            .map(|(i, _)| i)
    }

    fn primary_name(&self, index: usize) -> &str {
        self.requests[index]
            .primary_name()
            .map(str::trim)
            .unwrap_or("")
    }
}

pub struct CompanyIdResolver {
    normalizer: NameNormalizer,
    temp_ids: TemporaryIdGenerator,
    overrides: OverrideTable,
    cache: Option<Arc<dyn ResolutionCache>>,
    provider: Option<Arc<EqcProvider>>,
    queue: Option<Arc<DeferredResolutionQueue>>,
    exporter: Option<UnknownCompanyExporter>,
}

impl CompanyIdResolver {
    pub fn new(temp_ids: TemporaryIdGenerator) -> Self {
        Self {
            normalizer: *temp_ids.normalizer(),
            temp_ids,
            overrides: OverrideTable::default(),
            cache: None,
            provider: None,
            queue: None,
            exporter: None,
        }
    }

    pub fn with_overrides(mut self, overrides: OverrideTable) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResolutionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The provider's budget is reset to the strategy's budget at the start of each run
    pub fn with_provider(mut self, provider: Arc<EqcProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_queue(mut self, queue: Arc<DeferredResolutionQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_exporter(mut self, exporter: UnknownCompanyExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn normalizer(&self) -> &NameNormalizer {
        &self.normalizer
    }

    pub async fn resolve_batch(
        &self,
        rows: Vec<DataRow>,
        strategy: &ResolutionStrategy,
    ) -> ResolutionResult<ResolutionOutput> {
        let observer = EnrichmentObserver::new();
        self.resolve_batch_with_observer(rows, strategy, &observer)
            .await
    }

    /// Resolve a batch, recording into a caller-owned observer
    pub async fn resolve_batch_with_observer(
        &self,
        mut rows: Vec<DataRow>,
        strategy: &ResolutionStrategy,
        observer: &EnrichmentObserver,
    ) -> ResolutionResult<ResolutionOutput> {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let mut state = self.prepare(&rows, &strategy.columns);
        for _ in &state.requests {
            observer.record_lookup();
        }

        self.apply_overrides(&mut state);
        self.apply_cache(&mut state).await;
        self.apply_passthrough(&mut state).await;
        self.apply_external(&mut state, strategy, started, observer)
            .await;

        for info in state.resolved.iter().flatten() {
            observer.record_cache_hit(info.match_type);
        }

        let unresolved = state.unresolved().count();
        let fatal = if unresolved > 0 && !strategy.allow_temp_ids {
            Some(ResolutionError::UnresolvedRows { count: unresolved })
        } else {
            self.apply_fallback(&mut state, observer).await?;
            None
        };

        let stats = self.finish_run(&run_id, observer).await;
        let export_path = self.export_unknown(&run_id, &stats, observer);

        if let Some(error) = fatal {
            return Err(error);
        }

        for (row, info) in rows.iter_mut().zip(state.resolved) {
            let info = info.ok_or_else(|| ResolutionError::internal("row left without company id"))?;
            row.insert(strategy.output_column.clone(), Value::String(info.company_id));
        }

        Ok(ResolutionOutput {
            run_id,
            rows,
            stats,
            export_path,
        })
    }

    fn prepare(&self, rows: &[DataRow], columns: &ColumnMappingConfig) -> BatchState {
        let requests: Vec<ResolutionRequest> =
            rows.iter().map(|row| extract_request(row, columns)).collect();
        let candidate_keys = requests
            .iter()
            .map(|r| {
                r.candidate_names()
                    .map(|name| self.normalizer.normalize(name))
                    .filter(|key| !key.is_empty())
                    .collect()
            })
            .collect();
        let primary_keys = requests
            .iter()
            .map(|r| {
                r.primary_name()
                    .map(|name| self.normalizer.normalize(name))
                    .unwrap_or_default()
            })
            .collect();
        let resolved = vec![None; requests.len()];

        BatchState {
            requests,
            candidate_keys,
            primary_keys,
            resolved,
        }
    }

    fn apply_overrides(&self, state: &mut BatchState) {
        if self.overrides.is_empty() {
            return;
        }
        for (request, slot) in state.requests.iter().zip(state.resolved.iter_mut()) {
            if let Some(info) = self.overrides.lookup(request) {
                *slot = Some(info);
            }
        }
    }

    async fn apply_cache(&self, state: &mut BatchState) {
        let Some(cache) = &self.cache else {
            return;
        };

        let mut seen = HashSet::new();
        let wanted: Vec<String> = state
            .unresolved()
            .flat_map(|i| state.candidate_keys[i].iter())
            .filter(|key| seen.insert(key.as_str()))
            .cloned()
            .collect();
        if wanted.is_empty() {
            return;
        }

        let found = match cache.lookup_many(&wanted).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Cache tier unavailable; continuing with later tiers");
                return;
            }
        };

        for (keys, slot) in state.candidate_keys.iter().zip(state.resolved.iter_mut()) {
            if slot.is_some() {
                continue;
            }
            if let Some(entry) = keys.iter().find_map(|key| found.get(key)) {
                *slot = Some(entry.to_company_info());
            }
        }
    }

    async fn apply_passthrough(&self, state: &mut BatchState) {
        let mut backflow = Vec::new();
        let pending: Vec<usize> = state.unresolved().collect();

        for i in pending {
            let Some(existing) = state.requests[i]
                .existing_company_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
            else {
                continue;
            };

            let info = CompanyInfo::new(
                existing,
                state.primary_name(i),
                MatchType::Passthrough.default_confidence(),
                MatchType::Passthrough,
            );
            let key = &state.primary_keys[i];
            if !key.is_empty() && !is_temporary_id(existing) {
                backflow.push(CacheEntry::from_company(
                    key.as_str(),
                    &info,
                    PASSTHROUGH_CACHE_SOURCE,
                ));
            }
            state.resolved[i] = Some(info);
        }

        if backflow.is_empty() {
            return;
        }
        if let Some(cache) = &self.cache {
            match cache.insert_batch(backflow).await {
                Ok(result) => debug!(
                    inserted = result.inserted,
                    updated = result.updated,
                    kept_existing = result.kept_existing,
                    conflicts = result.conflicts,
                    "Passthrough backflow written"
                ),
                Err(e) => warn!(error = %e, "Passthrough backflow failed"),
            }
        }
    }

    /// Sequential external lookups, one per distinct normalized name
    async fn apply_external(
        &self,
        state: &mut BatchState,
        strategy: &ResolutionStrategy,
        started: Instant,
        observer: &EnrichmentObserver,
    ) {
        let Some(provider) = &self.provider else {
            return;
        };
        let budget = strategy.external_budget();
        provider.reset_budget(budget);
        if budget == 0 {
            return;
        }
        let deadline = strategy.batch_timeout.map(|timeout| started + timeout);

        let mut seen = HashSet::new();
        let names: Vec<(String, String)> = state
            .unresolved()
            .filter(|&i| !state.primary_keys[i].is_empty())
            .filter(|&i| seen.insert(state.primary_keys[i].clone()))
            .map(|i| (state.primary_keys[i].clone(), state.primary_name(i).to_string()))
            .collect();

        let mut found: HashMap<String, CompanyInfo> = HashMap::new();
        for (key, raw_name) in names {
            if !provider.is_available() {
                debug!("External tier exhausted or disabled; remaining rows fall back");
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!("Batch timeout reached; no further external lookups");
                break;
            }

            let budget_before = provider.remaining_budget();
            let outcome = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, provider.lookup_detailed(&raw_name))
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            if provider.remaining_budget() < budget_before {
                                observer.record_api_call();
                            }
                            warn!("Batch timeout reached; abandoning in-flight external lookup");
                            break;
                        }
                    }
                }
                None => provider.lookup_detailed(&raw_name).await,
            };

            if outcome.issued_call() {
                observer.record_api_call();
            }
            if let LookupOutcome::Found(info) = outcome {
                found.insert(key, info);
            }
        }

        observer.set_sync_budget_used(u64::from(
            budget.saturating_sub(provider.remaining_budget()),
        ));

        if found.is_empty() {
            return;
        }
        for (key, slot) in state.primary_keys.iter().zip(state.resolved.iter_mut()) {
            if slot.is_none() {
                if let Some(info) = found.get(key) {
                    *slot = Some(info.clone());
                }
            }
        }
    }

    async fn apply_fallback(
        &self,
        state: &mut BatchState,
        observer: &EnrichmentObserver,
    ) -> ResolutionResult<()> {
        let pending: Vec<usize> = state.unresolved().collect();
        let mut queued: HashSet<String> = HashSet::new();

        for i in pending {
            let key = state.primary_keys[i].clone();
            let raw_name = state.primary_name(i).to_string();
            let temp_id = self.temp_ids.generate_from_normalized(&key)?;

            if key.is_empty() {
                observer.record_temp_id("", &temp_id);
            } else {
                observer.record_temp_id(&raw_name, &temp_id);
                debug!(company_name = %raw_name, temporary_id = %temp_id, "Assigned temporary id");

                if let Some(queue) = &self.queue {
                    if queued.insert(key) {
                        match queue.enqueue(&raw_name, &temp_id).await {
                            Ok(EnqueueOutcome::Inserted | EnqueueOutcome::Refreshed) => {
                                observer.record_async_queued()
                            }
                            Ok(EnqueueOutcome::Skipped) => {}
                            Err(e) => warn!(error = %e, "Failed to enqueue deferred resolution"),
                        }
                    }
                }
            }

            state.resolved[i] = Some(CompanyInfo::new(
                temp_id,
                raw_name,
                MatchType::Temp.default_confidence(),
                MatchType::Temp,
            ));
        }
        Ok(())
    }

    /// Record the queue depth and emit the stats record
    async fn finish_run(&self, run_id: &str, observer: &EnrichmentObserver) -> EnrichmentStats {
        if let Some(queue) = &self.queue {
            match queue.depth().await {
                Ok(depth) => observer.set_queue_depth(depth),
                Err(e) => warn!(error = %e, "Could not read deferred queue depth"),
            }
        }
        let stats = observer.get_stats();
        stats.log_summary(run_id);
        stats
    }

    fn export_unknown(
        &self,
        run_id: &str,
        stats: &EnrichmentStats,
        observer: &EnrichmentObserver,
    ) -> Option<PathBuf> {
        let exporter = self.exporter.as_ref()?;
        if stats.temp_ids_generated == 0 {
            return None;
        }
        match exporter.export(run_id, &observer.get_unknown_companies()) {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "Unknown-company export failed");
                None
            }
        }
    }
}

/// Read the mapped columns of a row; blank cells count as absent
pub fn extract_request(row: &DataRow, columns: &ColumnMappingConfig) -> ResolutionRequest {
    ResolutionRequest {
        plan_code: cell(row, &columns.plan_code),
        customer_name: cell(row, &columns.customer_name),
        account_name: cell(row, &columns.account_name),
        existing_company_id: cell(row, &columns.existing_company_id),
    }
}

fn cell(row: &DataRow, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RepositoryError;
    use crate::repositories::MockResolutionCache;
    use serde_json::json;

    fn resolver() -> CompanyIdResolver {
        let generator = TemporaryIdGenerator::new("test-salt", NameNormalizer::default()).unwrap();
        CompanyIdResolver::new(generator)
    }

    fn row(value: Value) -> DataRow {
        match value {
            Value::Object(map) => map,
            _ => panic!("row fixtures must be objects"),
        }
    }

    #[test]
    fn test_extract_request_handles_numbers_and_blanks() {
        let columns = ColumnMappingConfig::default();
        let request = extract_request(
            &row(json!({
                "plan_code": 809,
                "customer_name": "  ",
                "account_name": "账户甲",
                "existing_company_id": null
            })),
            &columns,
        );
        assert_eq!(request.plan_code.as_deref(), Some("809"));
        assert_eq!(request.customer_name, None);
        assert_eq!(request.account_name.as_deref(), Some("账户甲"));
        assert_eq!(request.existing_company_id, None);
    }

    #[tokio::test]
    async fn test_without_any_store_every_row_gets_an_id() {
        let resolver = resolver();
        let rows = vec![
            row(json!({"customer_name": "中国平安"})),
            row(json!({"customer_name": ""})),
            row(json!({})),
        ];
        let output = resolver
            .resolve_batch(rows, &ResolutionStrategy::default().with_sync_budget(0))
            .await
            .unwrap();

        assert_eq!(output.rows[0]["company_id"], json!("IN_MPUMIFIMZ3J36FMU"));
        assert_eq!(output.rows[1]["company_id"], json!("IN_RFP6HFM5267IVH35"));
        assert_eq!(output.rows[2]["company_id"], json!("IN_RFP6HFM5267IVH35"));
        assert_eq!(output.stats.temp_ids_generated, 3);
        assert_eq!(output.stats.total_lookups, 3);
    }

    #[tokio::test]
    async fn test_failing_cache_degrades_to_next_tier() {
        let mut cache = MockResolutionCache::new();
        cache.expect_lookup_many().returning(|_| {
            Err(RepositoryError::Database(sea_orm::DbErr::Custom(
                "store offline".into(),
            )))
        });
        cache.expect_insert_batch().returning(|_| {
            Err(RepositoryError::Database(sea_orm::DbErr::Custom(
                "store offline".into(),
            )))
        });
        let resolver = resolver().with_cache(Arc::new(cache));

        let rows = vec![
            row(json!({"customer_name": "甲公司", "existing_company_id": "600000001"})),
            row(json!({"customer_name": "乙公司"})),
        ];
        let output = resolver
            .resolve_batch(rows, &ResolutionStrategy::default().with_sync_budget(0))
            .await
            .unwrap();

        assert_eq!(output.rows[0]["company_id"], json!("600000001"));
        assert!(
            output.rows[1]["company_id"]
                .as_str()
                .unwrap()
                .starts_with("IN_")
        );
        assert_eq!(output.stats.cache_hits.passthrough, 1);
    }

    #[tokio::test]
    async fn test_temp_ids_disallowed_is_fatal() {
        let resolver = resolver();
        let mut strategy = ResolutionStrategy::default().with_sync_budget(0);
        strategy.allow_temp_ids = false;

        let result = resolver
            .resolve_batch(vec![row(json!({"customer_name": "未知公司"}))], &strategy)
            .await;
        assert!(matches!(
            result,
            Err(ResolutionError::UnresolvedRows { count: 1 })
        ));
    }

    #[tokio::test]
    async fn test_custom_output_column() {
        let resolver = resolver().with_overrides(OverrideTable::new().with_plan_code("P1", "42"));
        let mut strategy = ResolutionStrategy::default().with_sync_budget(0);
        strategy.output_column = "resolved_id".to_string();

        let output = resolver
            .resolve_batch(vec![row(json!({"plan_code": "P1"}))], &strategy)
            .await
            .unwrap();
        assert_eq!(output.rows[0]["resolved_id"], json!("42"));
        assert!(output.rows[0].get("company_id").is_none());
    }
}
