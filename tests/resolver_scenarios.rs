mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use common::{FakeTransport, Harness, company_id, customer, found, generator, row};
use company_id_resolver::deferred::DeferredResolutionQueue;
use company_id_resolver::errors::ResolutionError;
use company_id_resolver::models::{
    CacheEntry, DeferredStatus, MatchType, ResolutionStrategy, is_temporary_id,
};
use company_id_resolver::normalization::normalize;
use company_id_resolver::repositories::ResolutionCache;
use company_id_resolver::services::{CompanyIdResolver, OverrideTable, UnknownCompanyExporter};

fn resolver(harness: &Harness) -> CompanyIdResolver {
    CompanyIdResolver::new(generator())
        .with_cache(harness.cache.clone())
        .with_queue(harness.queue.clone())
}

async fn seed_cache(harness: &Harness, raw_name: &str, company_id: &str) {
    harness
        .cache
        .insert_batch(vec![CacheEntry::new(
            normalize(raw_name),
            company_id,
            MatchType::Eqc,
            0.9,
            "seed",
        )])
        .await
        .unwrap();
}

fn queue_of(harness: &Harness) -> &DeferredResolutionQueue {
    harness.queue.as_ref()
}

#[tokio::test]
async fn test_override_cache_and_unknown_rows_without_budget() {
    let harness = Harness::new().await;
    seed_cache(&harness, "上海某某科技有限公司", "600000002").await;
    let transport = Arc::new(FakeTransport::not_found());

    let resolver = resolver(&harness)
        .with_overrides(OverrideTable::new().with_plan_code("P0809", "600000001"))
        .with_provider(harness.provider(transport.clone(), 5));
    let rows = vec![
        row(json!({ "plan_code": "P0809", "customer_name": "某某年金计划客户" })),
        customer("上海某某科技有限公司 "),
        customer("完全未知的公司"),
    ];

    let output = resolver
        .resolve_batch(rows, &ResolutionStrategy::default().with_sync_budget(0))
        .await
        .unwrap();

    assert_eq!(company_id(&output.rows[0]), "600000001");
    assert_eq!(company_id(&output.rows[1]), "600000002");
    let temp_id = company_id(&output.rows[2]);
    assert!(temp_id.starts_with("IN_"));
    assert_eq!(temp_id, generator().generate("完全未知的公司").unwrap());

    assert_eq!(output.stats.total_lookups, 3);
    assert_eq!(output.stats.temp_ids_generated, 1);
    assert_eq!(output.stats.cache_hits.override_hits, 1);
    assert_eq!(output.stats.cache_hits.cache, 1);
    assert_eq!(output.stats.api_calls, 0);
    assert_eq!(output.stats.async_queued, 1);
    assert_eq!(output.stats.queue_depth_after, 1);
    assert_eq!(transport.calls(), 0);

    let queued = queue_of(&harness)
        .get(&normalize("完全未知的公司"))
        .await
        .unwrap()
        .expect("unknown name is queued");
    assert_eq!(queued.status, DeferredStatus::Pending);
    assert_eq!(queued.temp_id, temp_id);
}

#[tokio::test]
async fn test_repeated_unknown_name_exports_one_record() {
    let harness = Harness::new().await;
    let export_dir = tempfile::tempdir().unwrap();
    let resolver =
        resolver(&harness).with_exporter(UnknownCompanyExporter::new(export_dir.path()));
    let rows = vec![
        customer("某某咨询有限公司"),
        customer(" 某某咨询有限公司"),
        customer("某某咨询有限公司-已转出"),
    ];

    let output = resolver
        .resolve_batch(rows, &ResolutionStrategy::default().with_sync_budget(0))
        .await
        .unwrap();

    let ids: Vec<&str> = output.rows.iter().map(company_id).collect();
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(output.stats.temp_ids_generated, 3);
    assert_eq!(output.stats.async_queued, 1);

    let path = output.export_path.expect("export written");
    assert!(path.starts_with(export_dir.path()));
    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        ["company_name", "temporary_id", "first_seen", "occurrence_count"]
    );
    let records: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(records.len(), 1);
    assert_eq!(&records[0][0], "某某咨询有限公司");
    assert_eq!(&records[0][1], ids[0]);
    assert_eq!(&records[0][3], "3");
}

#[tokio::test]
async fn test_external_hit_is_cached_for_the_next_run() {
    let harness = Harness::new().await;
    let transport =
        Arc::new(FakeTransport::not_found().then(found("600000003", "深圳某某实业有限公司")));
    let provider = harness.provider(transport.clone(), 5);
    let resolver = resolver(&harness).with_provider(provider.clone());
    let strategy = ResolutionStrategy::default().with_sync_budget(5);

    let first = resolver
        .resolve_batch(vec![customer("深圳某某实业有限公司")], &strategy)
        .await
        .unwrap();
    assert_eq!(company_id(&first.rows[0]), "600000003");
    assert_eq!(first.stats.api_calls, 1);
    assert_eq!(first.stats.sync_budget_used, 1);
    assert_eq!(first.stats.cache_hits.eqc, 1);

    let second = resolver
        .resolve_batch(vec![customer("深圳某某实业有限公司（已转出）")], &strategy)
        .await
        .unwrap();
    assert_eq!(company_id(&second.rows[0]), "600000003");
    assert_eq!(second.stats.cache_hits.cache, 1);
    assert_eq!(second.stats.api_calls, 0);
    assert_eq!(second.stats.sync_budget_used, 0);
    assert_eq!(provider.remaining_budget(), 5);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_tier_priority_per_row() {
    let harness = Harness::new().await;
    seed_cache(&harness, "甲公司", "cache-id").await;
    seed_cache(&harness, "乙公司", "cache-b").await;
    let resolver = resolver(&harness)
        .with_overrides(OverrideTable::new().with_customer_name("乙公司", "override-id"));

    let rows = vec![
        // override beats cache and passthrough
        row(json!({ "customer_name": "乙公司", "existing_company_id": "existing-b" })),
        // cache beats passthrough
        row(json!({ "customer_name": "甲公司", "existing_company_id": "existing-a" })),
        // passthrough only
        row(json!({ "customer_name": "丙公司", "existing_company_id": "existing-c" })),
    ];

    let output = resolver
        .resolve_batch(rows, &ResolutionStrategy::default().with_sync_budget(0))
        .await
        .unwrap();

    assert_eq!(company_id(&output.rows[0]), "override-id");
    assert_eq!(company_id(&output.rows[1]), "cache-id");
    assert_eq!(company_id(&output.rows[2]), "existing-c");
    assert_eq!(output.stats.cache_hits.override_hits, 1);
    assert_eq!(output.stats.cache_hits.cache, 1);
    assert_eq!(output.stats.cache_hits.passthrough, 1);
    assert_eq!(output.stats.temp_ids_generated, 0);

    let backflowed = harness.cache.lookup(&normalize("丙公司")).await.unwrap();
    assert_eq!(backflowed.map(|e| e.company_id), Some("existing-c".to_string()));
    // the cached mapping is not replaced by a passthrough value
    let kept = harness.cache.lookup(&normalize("甲公司")).await.unwrap();
    assert_eq!(kept.map(|e| e.company_id), Some("cache-id".to_string()));
}

#[tokio::test]
async fn test_account_name_used_when_customer_missing() {
    let harness = Harness::new().await;
    seed_cache(&harness, "丁公司", "account-id").await;

    let output = resolver(&harness)
        .resolve_batch(
            vec![row(json!({ "customer_name": "  ", "account_name": "丁公司" }))],
            &ResolutionStrategy::default().with_sync_budget(0),
        )
        .await
        .unwrap();

    assert_eq!(company_id(&output.rows[0]), "account-id");
}

#[tokio::test]
async fn test_every_row_gets_an_identifier() {
    let harness = Harness::new().await;
    let rows = vec![
        row(json!({})),
        row(json!({ "customer_name": "" })),
        row(json!({ "customer_name": "已转出" })),
        customer("戊公司"),
    ];

    let output = resolver(&harness)
        .resolve_batch(rows, &ResolutionStrategy::default().with_sync_budget(0))
        .await
        .unwrap();

    assert_eq!(output.rows.len(), 4);
    for row in &output.rows {
        assert!(is_temporary_id(company_id(row)));
    }
    // names that normalize to nothing share the empty-key id and are never queued
    let empty_id = generator().generate("").unwrap();
    assert_eq!(company_id(&output.rows[0]), empty_id);
    assert_eq!(company_id(&output.rows[2]), empty_id);
    assert_eq!(output.stats.temp_ids_generated, 4);
    assert_eq!(output.stats.async_queued, 1);
    assert_eq!(harness.queue.depth().await.unwrap(), 1);
}

#[tokio::test]
async fn test_external_calls_never_exceed_budget() {
    let harness = Harness::new().await;
    let transport = Arc::new(FakeTransport::not_found());
    let provider = harness.provider(transport.clone(), 0);
    let resolver = resolver(&harness).with_provider(provider.clone());
    let rows = ["一号公司", "二号公司", "三号公司", "四号公司"]
        .into_iter()
        .map(customer)
        .collect();

    let output = resolver
        .resolve_batch(rows, &ResolutionStrategy::default().with_sync_budget(2))
        .await
        .unwrap();

    assert_eq!(transport.calls(), 2);
    assert_eq!(output.stats.api_calls, 2);
    assert_eq!(output.stats.sync_budget_used, 2);
    assert_eq!(provider.remaining_budget(), 0);
    assert_eq!(output.stats.temp_ids_generated, 4);
    assert_eq!(output.stats.async_queued, 4);
}

#[tokio::test]
async fn test_one_external_call_per_distinct_name() {
    let harness = Harness::new().await;
    let transport = Arc::new(FakeTransport::not_found().then(found("600000004", "己公司")));
    let resolver = resolver(&harness).with_provider(harness.provider(transport.clone(), 0));
    let rows = vec![customer("己公司"), customer("己公司 "), customer("己公司-终止")];

    let output = resolver
        .resolve_batch(rows, &ResolutionStrategy::default().with_sync_budget(5))
        .await
        .unwrap();

    assert_eq!(transport.calls(), 1);
    assert!(output.rows.iter().all(|r| company_id(r) == "600000004"));
    assert_eq!(output.stats.cache_hits.eqc, 3);
    assert_eq!(output.stats.sync_budget_used, 1);
}

#[tokio::test]
async fn test_unauthorized_disables_external_tier() {
    let harness = Harness::new().await;
    let transport = Arc::new(FakeTransport::always(401, ""));
    let provider = harness.provider(transport.clone(), 0);
    let resolver = resolver(&harness).with_provider(provider.clone());
    let rows = vec![customer("庚公司"), customer("辛公司"), customer("壬公司")];

    let output = resolver
        .resolve_batch(rows, &ResolutionStrategy::default().with_sync_budget(5))
        .await
        .unwrap();

    assert_eq!(transport.calls(), 1);
    assert!(provider.is_disabled());
    assert_eq!(output.stats.api_calls, 1);
    assert_eq!(output.stats.temp_ids_generated, 3);

    // disabled for the life of the instance, even with fresh budget
    let again = resolver
        .resolve_batch(vec![customer("癸公司")], &ResolutionStrategy::default().with_sync_budget(5))
        .await
        .unwrap();
    assert_eq!(transport.calls(), 1);
    assert_eq!(again.stats.api_calls, 0);
}

#[tokio::test]
async fn test_batch_timeout_abandons_remaining_lookups() {
    let harness = Harness::new().await;
    let transport =
        Arc::new(FakeTransport::not_found().with_delay(Duration::from_millis(300)));
    let resolver = resolver(&harness).with_provider(harness.provider(transport.clone(), 0));
    let mut strategy = ResolutionStrategy::default().with_sync_budget(5);
    strategy.batch_timeout = Some(Duration::from_millis(50));
    let rows = vec![customer("慢一公司"), customer("慢二公司"), customer("慢三公司")];

    let output = resolver.resolve_batch(rows, &strategy).await.unwrap();

    assert_eq!(transport.calls(), 1);
    assert_eq!(output.rows.len(), 3);
    assert!(output.rows.iter().all(|r| is_temporary_id(company_id(r))));
    assert_eq!(output.stats.api_calls, 1);
}

#[tokio::test]
async fn test_unresolved_rows_fail_when_temp_ids_disallowed() {
    let harness = Harness::new().await;
    let mut strategy = ResolutionStrategy::default().with_sync_budget(0);
    strategy.allow_temp_ids = false;

    let result = resolver(&harness)
        .resolve_batch(vec![customer("无名公司")], &strategy)
        .await;

    assert!(matches!(result, Err(ResolutionError::UnresolvedRows { count: 1 })));
    assert_eq!(harness.queue.depth().await.unwrap(), 0);
}
