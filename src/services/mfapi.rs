// src/services/mfapi.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::MfApiConfig;
use crate::models::{FundHistory, FundMeta, FundRecord, NavEntry};
use crate::services::error::{Result, ServiceError};

const NAV_DATE_FORMAT: &str = "%d-%m-%Y";

/// Where fund catalogs and NAV histories come from.
#[async_trait]
pub trait FundDataSource: Send + Sync {
    /// Every scheme the provider knows, as {identifier, display name}.
    async fn fetch_catalog(&self) -> Result<Vec<FundRecord>>;

    /// Metadata plus the full NAV series, oldest first and one entry per date.
    async fn fetch_history(&self, scheme_code: &str) -> Result<FundHistory>;
}

// ── Wire format ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawScheme {
    #[serde(rename = "schemeCode", default)]
    scheme_code: Value,
    #[serde(rename = "schemeName", default)]
    scheme_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMeta {
    scheme_name: Option<String>,
    scheme_category: Option<String>,
    scheme_type: Option<String>,
    fund_house: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNav {
    date: String,
    nav: Value,
}

#[derive(Debug, Deserialize)]
struct RawHistory {
    #[serde(default)]
    meta: Option<RawMeta>,
    #[serde(default)]
    data: Vec<RawNav>,
}

// Codes arrive as numbers from the list endpoint and as strings elsewhere.
fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn catalog_from_raw(raw: Vec<RawScheme>) -> Vec<FundRecord> {
    raw.into_iter()
        .filter_map(|scheme| {
            let scheme_code = value_to_string(&scheme.scheme_code)?;
            let scheme_name = scheme.scheme_name?.trim().to_string();
            if scheme_name.is_empty() {
                return None;
            }
            Some(FundRecord { scheme_code, scheme_name })
        })
        .collect()
}

/// Parses one `{date: "DD-MM-YYYY", nav: "123.45"}` entry; bad or non-positive NAVs yield None.
pub fn parse_nav_entry(date: &str, nav: &Value) -> Option<NavEntry> {
    let date = NaiveDate::parse_from_str(date.trim(), NAV_DATE_FORMAT).ok()?;
    let nav = value_to_f64(nav)?;
    if !nav.is_finite() || nav <= 0.0 {
        return None;
    }
    Some(NavEntry { date, nav })
}

fn history_from_raw(scheme_code: &str, raw: RawHistory) -> Result<FundHistory> {
    let meta = raw.meta.unwrap_or_default();
    let total = raw.data.len();

    let mut navs: Vec<NavEntry> = raw
        .data
        .iter()
        .filter_map(|entry| parse_nav_entry(&entry.date, &entry.nav))
        .collect();

    let skipped = total - navs.len();
    if skipped > 0 {
        warn!("{}: skipped {} unparseable NAV entries", scheme_code, skipped);
    }

    // Stable sort keeps provider order among equal dates, so the first one wins the dedup.
    navs.sort_by_key(|entry| entry.date);
    navs.dedup_by_key(|entry| entry.date);

    if navs.is_empty() {
        return Err(ServiceError::DataUnavailable(format!(
            "No NAV history available for scheme {}",
            scheme_code
        )));
    }

    Ok(FundHistory {
        scheme_code: scheme_code.to_string(),
        meta: FundMeta {
            scheme_name: meta.scheme_name.unwrap_or_else(|| "Unknown Fund".to_string()),
            scheme_category: meta.scheme_category.unwrap_or_else(|| "Unknown Category".to_string()),
            scheme_type: meta.scheme_type.unwrap_or_else(|| "Unknown Type".to_string()),
            fund_house: meta.fund_house,
        },
        navs,
    })
}

/// Parses a raw `/mf/{code}` body.
pub fn parse_history_body(scheme_code: &str, body: &str) -> Result<FundHistory> {
    let raw: RawHistory = serde_json::from_str(body)
        .map_err(|e| ServiceError::Upstream(format!("Malformed NAV history for {}: {}", scheme_code, e)))?;
    history_from_raw(scheme_code, raw)
}

/// Parses a raw `/mf` catalog body.
pub fn parse_catalog_body(body: &str) -> Result<Vec<FundRecord>> {
    let raw: Vec<RawScheme> = serde_json::from_str(body)
        .map_err(|e| ServiceError::Upstream(format!("Malformed fund catalog: {}", e)))?;
    Ok(catalog_from_raw(raw))
}

pub fn validate_scheme_code(scheme_code: &str) -> Result<&str> {
    let code = scheme_code.trim();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ServiceError::invalid(format!("Invalid scheme code '{}'", scheme_code)));
    }
    Ok(code)
}

// ── mfapi.in client ───────────────────────────────────────────────────────────

pub struct MfApiClient {
    client: Client,
    base_url: String,
    catalog_timeout: Duration,
    history_timeout: Duration,
}

impl MfApiClient {
    pub fn new(config: &MfApiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("finance-bot-backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Upstream(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            catalog_timeout: Duration::from_secs(config.catalog_timeout_secs),
            history_timeout: Duration::from_secs(config.history_timeout_secs),
        })
    }

    fn catalog_url(&self) -> String {
        format!("{}/mf", self.base_url)
    }

    fn history_url(&self, scheme_code: &str) -> String {
        format!("{}/mf/{}", self.base_url, scheme_code)
    }
}

#[async_trait]
impl FundDataSource for MfApiClient {
    async fn fetch_catalog(&self) -> Result<Vec<FundRecord>> {
        let url = self.catalog_url();
        info!("Fetching fund catalog from URL: {}", url);

        let resp = self
            .client
            .get(&url)
            .timeout(self.catalog_timeout)
            .send()
            .await
            .map_err(|e| ServiceError::from_http("fund catalog", e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::Upstream(format!("fund catalog returned HTTP {}", status)));
        }

        let body = resp.text().await.map_err(|e| ServiceError::from_http("fund catalog", e))?;
        let catalog = parse_catalog_body(&body)?;
        info!("Fund catalog holds {} schemes", catalog.len());
        Ok(catalog)
    }

    async fn fetch_history(&self, scheme_code: &str) -> Result<FundHistory> {
        let scheme_code = validate_scheme_code(scheme_code)?;
        let url = self.history_url(scheme_code);
        info!("Fetching NAV history from URL: {}", url);

        let resp = self
            .client
            .get(&url)
            .timeout(self.history_timeout)
            .send()
            .await
            .map_err(|e| ServiceError::from_http("NAV history", e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::DataUnavailable(format!("Unknown scheme {}", scheme_code)));
        }
        if !status.is_success() {
            return Err(ServiceError::Upstream(format!("NAV history returned HTTP {}", status)));
        }

        let body = resp.text().await.map_err(|e| ServiceError::from_http("NAV history", e))?;
        let history = parse_history_body(scheme_code, &body)?;
        debug!(
            "{}: {} NAV entries ({:?} to {:?})",
            scheme_code,
            history.navs.len(),
            history.navs.first().map(|e| e.date),
            history.latest().map(|e| e.date)
        );
        Ok(history)
    }
}
