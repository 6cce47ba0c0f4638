/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Database defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/company-id-resolver.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

// EQC lookup defaults
// Local placeholder; deployments point this at their EQC gateway.
pub const DEFAULT_EQC_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_EQC_TIMEOUT: &str = "5s";
pub const DEFAULT_EQC_MAX_ATTEMPTS: u32 = 2;
pub const DEFAULT_SYNC_BUDGET: u32 = 5;
pub const MAX_SYNC_BUDGET: u32 = 10_000;

// Resolution defaults
// Documented development salt; production deployments must override it.
pub const DEFAULT_DEV_SALT: &str = "dev-salt-change-me";
pub const DEFAULT_ALLOW_TEMP_IDS: bool = true;
pub const DEFAULT_LOWERCASE_NAMES: bool = true;
pub const DEFAULT_OUTPUT_COLUMN: &str = "company_id";
pub const DEFAULT_PLAN_CODE_COLUMN: &str = "plan_code";
pub const DEFAULT_CUSTOMER_NAME_COLUMN: &str = "customer_name";
pub const DEFAULT_ACCOUNT_NAME_COLUMN: &str = "account_name";
pub const DEFAULT_EXISTING_ID_COLUMN: &str = "existing_company_id";

// Deferred queue defaults
pub const DEFAULT_BACKOFF_SCHEDULE: [&str; 3] = ["1m", "5m", "15m"];
pub const DEFAULT_QUEUE_POLL_INTERVAL: &str = "30s";
pub const DEFAULT_CLAIM_BATCH_SIZE: u64 = 50;
pub const DEFAULT_WORKER_BUDGET_PER_PASS: u32 = 20;
pub const DEFAULT_STALE_PROCESSING_AFTER: &str = "10m";

// Export defaults
pub const DEFAULT_EXPORT_ENABLED: bool = true;
pub const DEFAULT_EXPORT_DIRECTORY: &str = "./data/unknown_companies";
