// src/models.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::services::error::{Result, ServiceError};

// ---------------------------------------------------------------------------
// EMI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmiSingleRequest {
    pub principal: f64,
    pub annual_rate: f64,
    pub tenure_months: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanInput {
    #[serde(default)]
    pub loan_type: Option<String>,
    pub principal: f64,
    pub annual_rate: f64,
    pub tenure_months: u32,
}

impl LoanInput {
    pub fn validate(&self) -> Result<()> {
        validate_loan(self.principal, self.annual_rate, self.tenure_months)
    }
}

impl EmiSingleRequest {
    pub fn validate(&self) -> Result<()> {
        validate_loan(self.principal, self.annual_rate, self.tenure_months)
    }
}

fn validate_loan(principal: f64, annual_rate: f64, tenure_months: u32) -> Result<()> {
    if !(principal.is_finite() && principal > 0.0) {
        return Err(ServiceError::invalid("principal must be greater than 0"));
    }
    if !(annual_rate.is_finite() && annual_rate > 0.0) {
        return Err(ServiceError::invalid("annual_rate must be greater than 0"));
    }
    if tenure_months == 0 {
        return Err(ServiceError::invalid("tenure_months must be greater than 0"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmiLoanResult {
    pub loan_type: Option<String>,
    pub emi: f64,
    pub principal: f64,
    pub annual_rate: f64,
    pub tenure_months: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmiMultiRequest {
    pub loans: Vec<LoanInput>,
    #[serde(default)]
    pub monthly_income: Option<f64>,
}

impl EmiMultiRequest {
    pub fn validate(&self) -> Result<()> {
        if self.loans.is_empty() {
            return Err(ServiceError::invalid("at least one loan is required"));
        }
        for (i, loan) in self.loans.iter().enumerate() {
            loan.validate().map_err(|e| e.prefixed(&format!("loan {}", i + 1)))?;
        }
        if let Some(income) = self.monthly_income {
            if !(income.is_finite() && income > 0.0) {
                return Err(ServiceError::invalid("monthly_income must be greater than 0"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiLoanSummary {
    pub loans: Vec<EmiLoanResult>,
    pub total_emi: f64,
    pub monthly_income: Option<f64>,
    pub emi_to_income_ratio: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub advice: Option<String>,
}

// ---------------------------------------------------------------------------
// SIP
// ---------------------------------------------------------------------------

fn default_sip_day() -> u32 {
    5
}
fn default_expected_return() -> f64 {
    12.0
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SipRequest {
    #[serde(default)]
    pub scheme_code: Option<String>,
    #[serde(default)]
    pub scheme_name: Option<String>,
    pub monthly_amount: f64,
    pub years: f64,
    #[serde(default = "default_sip_day")]
    pub sip_day: u32,
    #[serde(default = "default_expected_return")]
    pub expected_return: f64,
    #[serde(default = "default_true")]
    pub use_nav_history: bool,
}

impl SipRequest {
    /// Rejects bad numbers before any external call is made.
    pub fn validate(&self) -> Result<()> {
        if !(self.monthly_amount.is_finite() && self.monthly_amount > 0.0) {
            return Err(ServiceError::invalid("monthly_amount must be greater than 0"));
        }
        if !(self.years.is_finite() && self.years > 0.0) {
            return Err(ServiceError::invalid("years must be greater than 0"));
        }
        if !(1..=28).contains(&self.sip_day) {
            return Err(ServiceError::invalid("sip_day must be between 1 and 28"));
        }
        if !(self.expected_return.is_finite() && self.expected_return >= 0.0) {
            return Err(ServiceError::invalid("expected_return must be 0 or more"));
        }
        if self.use_nav_history && self.scheme_code().is_none() && self.scheme_name().is_none() {
            return Err(ServiceError::invalid(
                "Please provide either scheme_name or scheme_code.",
            ));
        }
        Ok(())
    }

    pub fn scheme_code(&self) -> Option<&str> {
        non_blank(self.scheme_code.as_deref())
    }

    pub fn scheme_name(&self) -> Option<&str> {
        non_blank(self.scheme_name.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SipResult {
    pub scheme_name: String,
    pub scheme_category: String,
    pub scheme_type: String,
    pub total_invested: f64,
    pub current_value: f64,
    pub profit: f64,
    pub absolute_return_percent: f64,
    pub annual_return_percent: f64,
    pub total_units: f64,
    pub latest_nav: f64,
    pub installments: u32,
    pub planned_installments: u32,
    pub last_purchase_date: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Funds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavEntry {
    pub date: NaiveDate,
    pub nav: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FundRecord {
    pub scheme_code: String,
    pub scheme_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FundMatch {
    pub scheme_code: String,
    pub scheme_name: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FundMeta {
    pub scheme_name: String,
    pub scheme_category: String,
    pub scheme_type: String,
    pub fund_house: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundHistory {
    pub scheme_code: String,
    pub meta: FundMeta,
    /// Oldest first, one entry per date.
    pub navs: Vec<NavEntry>,
}

impl FundHistory {
    pub fn latest(&self) -> Option<&NavEntry> {
        self.navs.last()
    }
}

#[derive(Debug, Deserialize)]
pub struct FundSearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Numeric provider identifier taken from a URL path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeCode(pub String);

impl FromStr for SchemeCode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
            Ok(SchemeCode(s.to_string()))
        } else {
            Err(format!("'{}' is not a scheme code", s))
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        ChatTurn { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatTurn { role: "user".to_string(), content: content.into() }
    }
}

fn default_context_type() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_context_type")]
    pub context_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}
