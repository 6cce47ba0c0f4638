//! HTTP transport for the EQC company search service

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use url::Url;

use crate::errors::{LookupError, LookupResult};
use crate::models::{CompanyInfo, MatchType};

/// Search endpoint, relative to the configured base URL
pub const SEARCH_PATH: &str = "api/v1/companies/search";

/// Raw status and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Failures before any HTTP status was received
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Only network-level failures are worth a second attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Connect(_))
    }

    pub fn into_lookup_error(self, timeout: Duration) -> LookupError {
        match self {
            TransportError::Timeout => LookupError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            TransportError::Connect(message) => LookupError::Connection { message },
            TransportError::Other(message) => LookupError::Request { message },
        }
    }
}

/// One search request against the EQC service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EqcTransport: Send + Sync {
    async fn search(&self, name: &str, token: &str) -> Result<TransportResponse, TransportError>;
}

/// Successful search response body
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EqcSearchResponse {
    #[serde(deserialize_with = "string_or_number")]
    pub company_id: String,
    #[serde(default)]
    pub official_name: String,
    #[serde(default)]
    pub unified_credit_code: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub match_type: Option<String>,
}

impl EqcSearchResponse {
    pub fn parse(body: &str) -> LookupResult<Self> {
        let response: Self = serde_json::from_str(body).map_err(|e| LookupError::Parse {
            message: e.to_string(),
        })?;
        if response.company_id.trim().is_empty() {
            return Err(LookupError::Parse {
                message: "empty company_id".to_string(),
            });
        }
        Ok(response)
    }

    /// Results from this service are always attributed to the EQC tier
    pub fn into_company_info(self) -> CompanyInfo {
        let confidence = self
            .confidence
            .unwrap_or_else(|| MatchType::Eqc.default_confidence());
        let credit_code = self.unified_credit_code.filter(|c| !c.trim().is_empty());
        CompanyInfo::new(
            self.company_id.trim(),
            self.official_name,
            confidence,
            MatchType::Eqc,
        )
        .with_credit_code(credit_code)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    search_url: Url,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> LookupResult<Self> {
        let mut base = Url::parse(base_url).map_err(|e| LookupError::Request {
            message: format!("invalid EQC base URL: {e}"),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let search_url = base.join(SEARCH_PATH).map_err(|e| LookupError::Request {
            message: format!("invalid EQC search URL: {e}"),
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("company-id-resolver/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LookupError::Request {
                message: e.to_string(),
            })?;

        Ok(Self { client, search_url })
    }

    pub fn search_url(&self) -> &Url {
        &self.search_url
    }
}

#[async_trait]
impl EqcTransport for ReqwestTransport {
    async fn search(&self, name: &str, token: &str) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(self.search_url.clone())
            .query(&[("keyword", name)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest_error)?;
        Ok(TransportResponse { status, body })
    }
}

/// The request URL carries the searched name, so it never reaches the message
fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    let err = err.without_url();
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_response() {
        let body = r#"{
            "company_id": "614810477",
            "official_name": "中国平安保险(集团)股份有限公司",
            "unified_credit_code": "91440300100012316L",
            "confidence": 0.97,
            "match_type": "exact"
        }"#;
        let info = EqcSearchResponse::parse(body).unwrap().into_company_info();
        assert_eq!(info.company_id, "614810477");
        assert_eq!(info.match_type, MatchType::Eqc);
        assert_eq!(info.unified_credit_code.as_deref(), Some("91440300100012316L"));
        assert!((info.confidence - 0.97).abs() < 1e-9);
    }

    #[test]
    fn test_parse_numeric_id_and_clamps_confidence() {
        let info = EqcSearchResponse::parse(r#"{"company_id": 42, "confidence": 3.5}"#)
            .unwrap()
            .into_company_info();
        assert_eq!(info.company_id, "42");
        assert_eq!(info.confidence, 1.0);
    }

    #[test]
    fn test_parse_rejects_bad_bodies() {
        assert!(matches!(
            EqcSearchResponse::parse("not json"),
            Err(LookupError::Parse { .. })
        ));
        assert!(EqcSearchResponse::parse(r#"{"company_id": "  "}"#).is_err());
        assert!(EqcSearchResponse::parse(r#"{"official_name": "x"}"#).is_err());
    }

    #[test]
    fn test_search_url_keeps_base_path() {
        let transport =
            ReqwestTransport::new("https://eqc.example.com/gateway", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            transport.search_url().as_str(),
            "https://eqc.example.com/gateway/api/v1/companies/search"
        );
        assert!(ReqwestTransport::new("not a url", Duration::from_secs(5)).is_err());
    }

    #[tokio::test]
    async fn test_connection_error_omits_searched_name() {
        let transport =
            ReqwestTransport::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let error = transport
            .search("中国平安", "token")
            .await
            .expect_err("nothing listens on port 1");
        assert!(error.is_retryable(), "{error:?}");

        let message = error.into_lookup_error(Duration::from_secs(2)).to_string();
        assert!(!message.contains("keyword="), "{message}");
        assert!(!message.contains("%E4%B8%AD"), "{message}");
        assert!(!message.contains("中国平安"), "{message}");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::Connect("refused".into()).is_retryable());
        assert!(!TransportError::Other("tls".into()).is_retryable());
        assert_eq!(
            TransportError::Timeout.into_lookup_error(Duration::from_secs(5)),
            LookupError::Timeout { timeout_ms: 5000 }
        );
    }
}
