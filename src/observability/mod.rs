//! OpenTelemetry mirror of the enrichment counters
//!
//! Instruments come from the global meter. The composition root installs an
//! `SdkMeterProvider` whose periodic reader pushes them to an OTLP collector
//! when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Gauge, Meter},
};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider, exporter::PushMetricExporter};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::MatchType;

const METER_NAME: &str = "company-id-resolver";
const EXPORT_INTERVAL: Duration = Duration::from_secs(30);
const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

#[derive(Clone)]
pub struct ResolverMetrics {
    pub meter: Meter,
    pub lookups: Counter<u64>,
    pub tier_hits: Counter<u64>,
    pub temp_ids: Counter<u64>,
    pub api_calls: Counter<u64>,
    pub async_queued: Counter<u64>,
    pub queue_depth: Gauge<u64>,
}

impl ResolverMetrics {
    fn build_with_instruments(meter: Meter) -> Self {
        let lookups = meter
            .u64_counter("company_id_lookups_total")
            .with_description("Rows submitted for company id resolution")
            .build();
        let tier_hits = meter
            .u64_counter("company_id_tier_hits_total")
            .with_description("Rows resolved by an authoritative tier, by match type")
            .build();
        let temp_ids = meter
            .u64_counter("company_id_temp_ids_total")
            .with_description("Rows assigned a temporary id")
            .build();
        let api_calls = meter
            .u64_counter("company_id_external_calls_total")
            .with_description("Calls issued to the external lookup service")
            .build();
        let async_queued = meter
            .u64_counter("company_id_deferred_enqueued_total")
            .with_description("Names queued for deferred resolution")
            .build();
        let queue_depth = meter
            .u64_gauge("company_id_deferred_queue_depth")
            .with_description("Pending and processing deferred resolutions")
            .build();

        Self {
            meter,
            lookups,
            tier_hits,
            temp_ids,
            api_calls,
            async_queued,
            queue_depth,
        }
    }

    pub fn record_tier_hit(&self, match_type: MatchType) {
        self.tier_hits
            .add(1, &[KeyValue::new("match_type", match_type.to_string())]);
    }
}

/// Process-wide instruments bound to the global meter provider
pub fn metrics() -> &'static ResolverMetrics {
    static METRICS: OnceLock<ResolverMetrics> = OnceLock::new();
    METRICS.get_or_init(|| ResolverMetrics::build_with_instruments(global::meter(METER_NAME)))
}

/// Meter provider that pushes every instrument to `exporter` on a fixed interval
pub fn build_meter_provider<E>(exporter: E) -> SdkMeterProvider
where
    E: PushMetricExporter,
{
    let reader = PeriodicReader::builder(exporter)
        .with_interval(EXPORT_INTERVAL)
        .build();
    SdkMeterProvider::builder().with_reader(reader).build()
}

/// Install the process meter provider as the global provider
///
/// Call before the first `metrics()` access, or instruments stay no-ops.
/// Without an OTLP endpoint the provider has no reader and measurements are dropped.
pub fn init_meter_provider() -> SdkMeterProvider {
    let provider = match std::env::var(OTLP_ENDPOINT_ENV) {
        Ok(endpoint) => match opentelemetry_otlp::MetricExporter::builder()
            .with_http()
            .build()
        {
            Ok(exporter) => {
                info!("OpenTelemetry configured: OTLP metrics to {}", endpoint);
                build_meter_provider(exporter)
            }
            Err(e) => {
                warn!("Failed to build OTLP metric exporter: {}", e);
                SdkMeterProvider::builder().build()
            }
        },
        Err(_) => {
            info!("OpenTelemetry configured: local metrics only (OTLP endpoint not configured)");
            SdkMeterProvider::builder().build()
        }
    };
    global::set_meter_provider(provider.clone());
    provider
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider;
    use opentelemetry_sdk::metrics::InMemoryMetricExporter;

    fn exported_names(exporter: &InMemoryMetricExporter) -> Vec<String> {
        exporter
            .get_finished_metrics()
            .unwrap()
            .iter()
            .flat_map(|resource| resource.scope_metrics())
            .flat_map(|scope| scope.metrics())
            .map(|metric| metric.name().to_string())
            .collect()
    }

    #[test]
    fn test_counters_reach_the_exporter() {
        let exporter = InMemoryMetricExporter::default();
        let provider = build_meter_provider(exporter.clone());
        let metrics = ResolverMetrics::build_with_instruments(provider.meter(METER_NAME));

        metrics.lookups.add(3, &[]);
        metrics.record_tier_hit(MatchType::Cache);
        metrics.queue_depth.record(2, &[]);
        provider.force_flush().unwrap();

        let names = exported_names(&exporter);
        assert!(names.iter().any(|n| n == "company_id_lookups_total"), "{names:?}");
        assert!(names.iter().any(|n| n == "company_id_tier_hits_total"), "{names:?}");
        assert!(names.iter().any(|n| n == "company_id_deferred_queue_depth"), "{names:?}");
        provider.shutdown().unwrap();
    }
}
