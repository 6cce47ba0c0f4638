use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

/// Environment prefix for configuration overrides (`COMPANY_ID_EQC__TOKEN`, ...)
pub const ENV_PREFIX: &str = "COMPANY_ID_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub eqc: EqcConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub queue: DeferredQueueConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    pub max_connections: Option<u32>,
}

/// Connection settings for the external EQC lookup service
#[derive(Clone, Serialize, Deserialize)]
pub struct EqcConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_eqc_base_url")]
    pub base_url: String,
    /// Bearer token; captured outside this process
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_eqc_timeout", with = "duration_serde::duration")]
    pub timeout: Duration,
    /// Total attempts per lookup, including the first one
    #[serde(default = "default_eqc_max_attempts")]
    pub max_attempts: u32,
    /// External calls permitted per resolution run; 0 disables the tier
    #[serde(default = "default_sync_budget")]
    pub sync_budget: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default = "default_salt")]
    pub salt: String,
    #[serde(default = "default_allow_temp_ids")]
    pub allow_temp_ids: bool,
    /// Lower-case normalized names (not part of the legacy rules)
    #[serde(default = "default_lowercase")]
    pub lowercase: bool,
    #[serde(default)]
    pub columns: ColumnMappingConfig,
    #[serde(default = "default_output_column")]
    pub output_column: String,
    #[serde(default, with = "duration_serde::option_duration")]
    pub batch_timeout: Option<Duration>,
    pub overrides_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMappingConfig {
    #[serde(default = "default_plan_code_column")]
    pub plan_code: String,
    #[serde(default = "default_customer_name_column")]
    pub customer_name: String,
    #[serde(default = "default_account_name_column")]
    pub account_name: String,
    #[serde(default = "default_existing_id_column")]
    pub existing_company_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredQueueConfig {
    /// Delays between attempts; once exhausted an entry stays failed
    #[serde(default = "default_backoff_schedule", with = "duration_serde::duration_vec")]
    pub backoff_schedule: Vec<Duration>,
    #[serde(default = "default_poll_interval", with = "duration_serde::duration")]
    pub poll_interval: Duration,
    #[serde(default = "default_claim_batch_size")]
    pub claim_batch_size: u64,
    #[serde(default = "default_worker_budget")]
    pub worker_budget_per_pass: u32,
    #[serde(default = "default_stale_after", with = "duration_serde::duration")]
    pub stale_after: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_enabled")]
    pub enabled: bool,
    #[serde(default = "default_export_directory")]
    pub directory: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_eqc_base_url() -> String {
    DEFAULT_EQC_BASE_URL.to_string()
}

fn default_eqc_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_EQC_TIMEOUT).unwrap_or(Duration::from_secs(5))
}

fn default_eqc_max_attempts() -> u32 {
    DEFAULT_EQC_MAX_ATTEMPTS
}

fn default_sync_budget() -> u32 {
    DEFAULT_SYNC_BUDGET
}

fn default_salt() -> String {
    DEFAULT_DEV_SALT.to_string()
}

fn default_allow_temp_ids() -> bool {
    DEFAULT_ALLOW_TEMP_IDS
}

fn default_lowercase() -> bool {
    DEFAULT_LOWERCASE_NAMES
}

fn default_output_column() -> String {
    DEFAULT_OUTPUT_COLUMN.to_string()
}

fn default_plan_code_column() -> String {
    DEFAULT_PLAN_CODE_COLUMN.to_string()
}

fn default_customer_name_column() -> String {
    DEFAULT_CUSTOMER_NAME_COLUMN.to_string()
}

fn default_account_name_column() -> String {
    DEFAULT_ACCOUNT_NAME_COLUMN.to_string()
}

fn default_existing_id_column() -> String {
    DEFAULT_EXISTING_ID_COLUMN.to_string()
}

fn default_backoff_schedule() -> Vec<Duration> {
    DEFAULT_BACKOFF_SCHEDULE
        .iter()
        .filter_map(|s| humantime::parse_duration(s).ok())
        .collect()
}

fn default_poll_interval() -> Duration {
    humantime::parse_duration(DEFAULT_QUEUE_POLL_INTERVAL).unwrap_or(Duration::from_secs(30))
}

fn default_claim_batch_size() -> u64 {
    DEFAULT_CLAIM_BATCH_SIZE
}

fn default_worker_budget() -> u32 {
    DEFAULT_WORKER_BUDGET_PER_PASS
}

fn default_stale_after() -> Duration {
    humantime::parse_duration(DEFAULT_STALE_PROCESSING_AFTER).unwrap_or(Duration::from_secs(600))
}

fn default_export_enabled() -> bool {
    DEFAULT_EXPORT_ENABLED
}

fn default_export_directory() -> PathBuf {
    PathBuf::from(DEFAULT_EXPORT_DIRECTORY)
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: Some(DEFAULT_MAX_CONNECTIONS),
        }
    }
}

impl Default for EqcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_eqc_base_url(),
            token: None,
            timeout: default_eqc_timeout(),
            max_attempts: default_eqc_max_attempts(),
            sync_budget: default_sync_budget(),
        }
    }
}

impl fmt::Debug for EqcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EqcConfig")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("sync_budget", &self.sync_budget)
            .finish()
    }
}

impl EqcConfig {
    /// Token with surrounding whitespace removed; blank tokens count as missing
    pub fn credential(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            salt: default_salt(),
            allow_temp_ids: default_allow_temp_ids(),
            lowercase: default_lowercase(),
            columns: ColumnMappingConfig::default(),
            output_column: default_output_column(),
            batch_timeout: None,
            overrides_path: None,
        }
    }
}

impl Default for ColumnMappingConfig {
    fn default() -> Self {
        Self {
            plan_code: default_plan_code_column(),
            customer_name: default_customer_name_column(),
            account_name: default_account_name_column(),
            existing_company_id: default_existing_id_column(),
        }
    }
}

impl Default for DeferredQueueConfig {
    fn default() -> Self {
        Self {
            backoff_schedule: default_backoff_schedule(),
            poll_interval: default_poll_interval(),
            claim_batch_size: default_claim_batch_size(),
            worker_budget_per_pass: default_worker_budget(),
            stale_after: default_stale_after(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: default_export_enabled(),
            directory: default_export_directory(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            eqc: EqcConfig::default(),
            resolution: ResolutionConfig::default(),
            queue: DeferredQueueConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Config {
    /// Load from `CONFIG_FILE` (or the default file name) plus environment overrides
    pub fn load() -> Result<Self> {
        let config_file = std::env::var("CONFIG_FILE")
            .unwrap_or_else(|_| "company-id-resolver.toml".to_string());
        Self::load_from_file(&config_file)
    }

    /// Layer defaults, the TOML file (when present) and `COMPANY_ID_*` variables
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if Path::new(config_file).exists() {
            figment = figment.merge(Toml::file(config_file));
            info!("Loading configuration from: {}", config_file);
        } else {
            info!(
                "Configuration file {} not found, using defaults and environment",
                config_file
            );
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment layering)
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::string(contents))
            .extract()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.eqc.sync_budget > MAX_SYNC_BUDGET {
            anyhow::bail!(
                "eqc.sync_budget {} exceeds maximum {}",
                self.eqc.sync_budget,
                MAX_SYNC_BUDGET
            );
        }
        if self.eqc.max_attempts == 0 {
            anyhow::bail!("eqc.max_attempts must be at least 1");
        }
        if self.eqc.timeout.is_zero() {
            anyhow::bail!("eqc.timeout must be greater than zero");
        }
        let base = url::Url::parse(self.eqc.base_url.trim())
            .with_context(|| format!("eqc.base_url {:?} is invalid", self.eqc.base_url))?;
        if !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("eqc.base_url must use http or https");
        }
        if self.queue.claim_batch_size == 0 {
            anyhow::bail!("queue.claim_batch_size must be at least 1");
        }
        if self.queue.poll_interval.is_zero() {
            anyhow::bail!("queue.poll_interval must be greater than zero");
        }
        if self.resolution.output_column.trim().is_empty() {
            anyhow::bail!("resolution.output_column must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.eqc.sync_budget, 5);
        assert_eq!(config.eqc.timeout, Duration::from_secs(5));
        assert_eq!(config.eqc.max_attempts, 2);
        assert_eq!(config.eqc.base_url, "http://localhost:8080");
        assert_eq!(config.resolution.salt, DEFAULT_DEV_SALT);
        assert_eq!(
            config.queue.backoff_schedule,
            vec![
                Duration::from_secs(60),
                Duration::from_secs(300),
                Duration::from_secs(900)
            ]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [eqc]
            sync_budget = 0
            token = "abc"

            [queue]
            backoff_schedule = ["30s", "2m"]

            [resolution]
            salt = "prod-salt"
            batch_timeout = "90s"
            "#,
        )
        .unwrap();

        assert_eq!(config.eqc.sync_budget, 0);
        assert_eq!(config.eqc.credential(), Some("abc"));
        assert_eq!(config.eqc.timeout, Duration::from_secs(5));
        assert_eq!(config.queue.backoff_schedule.len(), 2);
        assert_eq!(config.resolution.salt, "prod-salt");
        assert_eq!(config.resolution.batch_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.resolution.columns.customer_name, "customer_name");
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let result = Config::from_toml_str(
            r#"
            [eqc]
            max_attempts = 0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_bad_base_url() {
        for base_url in ["", "eqc gateway", "ftp://eqc.example.com"] {
            let config = Config {
                eqc: EqcConfig {
                    base_url: base_url.to_string(),
                    ..EqcConfig::default()
                },
                ..Config::default()
            };
            assert!(config.validate().is_err(), "{base_url:?}");
        }

        let gateway = Config::from_toml_str(
            r#"
            [eqc]
            base_url = "https://eqc.example.com/gateway"
            "#,
        )
        .unwrap();
        assert_eq!(gateway.eqc.base_url, "https://eqc.example.com/gateway");
    }

    #[test]
    fn test_token_is_redacted_in_debug() {
        let eqc = EqcConfig {
            token: Some("secret-token".to_string()),
            ..EqcConfig::default()
        };
        let rendered = format!("{eqc:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_blank_token_is_missing() {
        let eqc = EqcConfig {
            token: Some("   ".to_string()),
            ..EqcConfig::default()
        };
        assert_eq!(eqc.credential(), None);
    }
}
