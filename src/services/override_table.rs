//! Static override tables consulted before any other tier
//!
//! Loaded from TOML:
//!
//! ```toml
//! [plan_codes]
//! "P0809" = "608349737"
//!
//! [account_names]
//! "平安年金账户" = "614810477"
//!
//! [customer_names]
//! "中国平安" = "614810477"
//! ```
//!
//! Keys are matched exactly after trimming surrounding whitespace.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::errors::{ResolutionError, ResolutionResult};
use crate::models::{CompanyInfo, MatchType, ResolutionRequest};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverrideTable {
    #[serde(default)]
    plan_codes: HashMap<String, String>,
    #[serde(default)]
    account_names: HashMap<String, String>,
    #[serde(default)]
    customer_names: HashMap<String, String>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(contents: &str) -> ResolutionResult<Self> {
        let raw: OverrideTable = toml::from_str(contents)
            .map_err(|e| ResolutionError::configuration(format!("invalid override table: {e}")))?;
        Ok(Self {
            plan_codes: trim_keys(raw.plan_codes),
            account_names: trim_keys(raw.account_names),
            customer_names: trim_keys(raw.customer_names),
        })
    }

    pub fn load(path: &Path) -> ResolutionResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ResolutionError::configuration(format!(
                "cannot read override table {}: {e}",
                path.display()
            ))
        })?;
        let table = Self::from_toml_str(&contents)?;
        info!(
            plan_codes = table.plan_codes.len(),
            account_names = table.account_names.len(),
            customer_names = table.customer_names.len(),
            "Loaded override table"
        );
        Ok(table)
    }

    pub fn with_plan_code(mut self, plan_code: &str, company_id: &str) -> Self {
        self.plan_codes
            .insert(plan_code.trim().to_string(), company_id.trim().to_string());
        self
    }

    pub fn with_account_name(mut self, account_name: &str, company_id: &str) -> Self {
        self.account_names
            .insert(account_name.trim().to_string(), company_id.trim().to_string());
        self
    }

    pub fn with_customer_name(mut self, customer_name: &str, company_id: &str) -> Self {
        self.customer_names
            .insert(customer_name.trim().to_string(), company_id.trim().to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.plan_codes.len() + self.account_names.len() + self.customer_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Plan code first, then account name, then customer name
    pub fn lookup(&self, request: &ResolutionRequest) -> Option<CompanyInfo> {
        let hit = |table: &HashMap<String, String>, key: Option<&str>| {
            key.map(str::trim)
                .filter(|k| !k.is_empty())
                .and_then(|k| table.get(k).map(|id| (k.to_string(), id.clone())))
        };

        let (matched_key, company_id) = hit(&self.plan_codes, request.plan_code.as_deref())
            .or_else(|| hit(&self.account_names, request.account_name.as_deref()))
            .or_else(|| hit(&self.customer_names, request.customer_name.as_deref()))?;

        let official_name = request
            .primary_name()
            .map(str::trim)
            .map(str::to_string)
            .unwrap_or(matched_key);
        Some(CompanyInfo::new(
            company_id,
            official_name,
            MatchType::Override.default_confidence(),
            MatchType::Override,
        ))
    }
}

fn trim_keys(map: HashMap<String, String>) -> HashMap<String, String> {
    map.into_iter()
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect()
}
