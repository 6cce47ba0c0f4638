#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use company_id_resolver::config::DeferredQueueConfig;
use company_id_resolver::database::Database;
use company_id_resolver::database::repositories::CompanyNameIndexSeaOrmRepository;
use company_id_resolver::deferred::DeferredResolutionQueue;
use company_id_resolver::normalization::NameNormalizer;
use company_id_resolver::services::{DataRow, EqcProvider};
use company_id_resolver::sources::{EqcTransport, TransportError, TransportResponse};
use company_id_resolver::utils::TemporaryIdGenerator;

pub const TEST_SALT: &str = "integration-salt";
pub const TEST_TOKEN: &str = "test-token";

/// Scripted stand-in for the EQC HTTP service
///
/// Responses are served in order; once the script runs out every call gets
/// the fallback response.
pub struct FakeTransport {
    script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    fallback: TransportResponse,
    delay: Option<Duration>,
    calls: AtomicUsize,
    names: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new(fallback: TransportResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
            names: Mutex::new(Vec::new()),
        }
    }

    /// Every call answers 404
    pub fn not_found() -> Self {
        Self::new(TransportResponse::new(404, ""))
    }

    pub fn always(status: u16, body: impl Into<String>) -> Self {
        Self::new(TransportResponse::new(status, body))
    }

    pub fn then(self, response: Result<TransportResponse, TransportError>) -> Self {
        self.script.lock().unwrap().push_back(response);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

#[async_trait]
impl EqcTransport for FakeTransport {
    async fn search(&self, name: &str, _token: &str) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.names.lock().unwrap().push(name.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

pub fn found_body(company_id: &str, official_name: &str) -> String {
    json!({
        "company_id": company_id,
        "official_name": official_name,
        "confidence": 0.95
    })
    .to_string()
}

pub fn found(company_id: &str, official_name: &str) -> Result<TransportResponse, TransportError> {
    Ok(TransportResponse::new(200, found_body(company_id, official_name)))
}

/// In-memory stores shared by one test
pub struct Harness {
    pub database: Database,
    pub cache: Arc<CompanyNameIndexSeaOrmRepository>,
    pub queue: Arc<DeferredResolutionQueue>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_queue_config(&DeferredQueueConfig::default()).await
    }

    pub async fn with_queue_config(config: &DeferredQueueConfig) -> Self {
        let database = Database::in_memory().await.expect("in-memory database");
        let cache = Arc::new(CompanyNameIndexSeaOrmRepository::new(database.connection()));
        let queue = Arc::new(DeferredResolutionQueue::from_config(
            database.connection(),
            cache.clone(),
            NameNormalizer::default(),
            config,
        ));
        Self {
            database,
            cache,
            queue,
        }
    }

    pub fn provider(&self, transport: Arc<FakeTransport>, budget: u32) -> Arc<EqcProvider> {
        Arc::new(
            EqcProvider::new(
                transport,
                Some(TEST_TOKEN.to_string()),
                budget,
                NameNormalizer::default(),
            )
            .with_cache(self.cache.clone())
            .with_timeout(Duration::from_secs(1)),
        )
    }
}

pub fn generator() -> TemporaryIdGenerator {
    TemporaryIdGenerator::new(TEST_SALT, NameNormalizer::default()).expect("salt is set")
}

pub fn row(fields: Value) -> DataRow {
    match fields {
        Value::Object(map) => map,
        other => panic!("row must be a JSON object, got {other}"),
    }
}

pub fn customer(name: &str) -> DataRow {
    row(json!({ "customer_name": name }))
}

pub fn company_id(row: &DataRow) -> &str {
    row.get("company_id")
        .and_then(Value::as_str)
        .expect("company_id column is set")
}
