// src/services/emi.rs
use log::debug;

use crate::models::{EmiLoanResult, LoanInput, MultiLoanSummary, RiskLevel};
use crate::services::error::{Result, ServiceError};
use crate::services::round_to;

const LOW_RISK_ADVICE: &str = "Your EMI to income ratio is healthy. \
You can continue with current EMIs, but avoid taking new high-interest loans.";
const MEDIUM_RISK_ADVICE: &str = "Your EMI burden is moderate. \
Try to avoid new loans and consider prepaying high-interest loans when possible.";
const HIGH_RISK_ADVICE: &str = "Your EMI burden is high. \
Consider restructuring or prepaying some loans, reducing discretionary expenses, and avoiding any new debt.";

/// Standard amortization installment, rounded to 2 decimals:
/// EMI = P * r * (1 + r)^n / ((1 + r)^n - 1), r being the monthly rate.
pub fn calculate_emi(principal: f64, annual_rate: f64, tenure_months: u32) -> f64 {
    let r = annual_rate / 12.0 / 100.0;
    let n = tenure_months as f64;

    if r == 0.0 {
        return round_to(principal / n, 2);
    }

    let growth = (1.0 + r).powf(n);
    round_to(principal * r * growth / (growth - 1.0), 2)
}

/// `calculate_emi`, rejecting terms whose installment overflows to inf/NaN.
pub fn checked_emi(principal: f64, annual_rate: f64, tenure_months: u32) -> Result<f64> {
    let emi = calculate_emi(principal, annual_rate, tenure_months);
    if emi.is_finite() {
        Ok(emi)
    } else {
        Err(ServiceError::invalid("loan terms are too large to compute a finite EMI"))
    }
}

impl RiskLevel {
    /// Buckets an EMI-to-income ratio (percent): up to 30 is low, up to 50 medium.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio <= 30.0 {
            RiskLevel::Low
        } else if ratio <= 50.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            RiskLevel::Low => LOW_RISK_ADVICE,
            RiskLevel::Medium => MEDIUM_RISK_ADVICE,
            RiskLevel::High => HIGH_RISK_ADVICE,
        }
    }
}

pub fn loan_result(loan: &LoanInput) -> Result<EmiLoanResult> {
    Ok(EmiLoanResult {
        loan_type: loan.loan_type.clone(),
        emi: checked_emi(loan.principal, loan.annual_rate, loan.tenure_months)?,
        principal: loan.principal,
        annual_rate: loan.annual_rate,
        tenure_months: loan.tenure_months,
    })
}

/// Computes every loan independently and scores the combined burden
/// against the monthly income when one is given.
pub fn calculate_multi_emi(loans: &[LoanInput], monthly_income: Option<f64>) -> Result<MultiLoanSummary> {
    let results = loans
        .iter()
        .enumerate()
        .map(|(i, loan)| loan_result(loan).map_err(|e| e.prefixed(&format!("loan {}", i + 1))))
        .collect::<Result<Vec<EmiLoanResult>>>()?;
    let total_emi = round_to(results.iter().map(|r| r.emi).sum::<f64>(), 2);
    if !total_emi.is_finite() {
        return Err(ServiceError::invalid("combined EMI is too large to compute"));
    }

    let (ratio, risk_level) = match monthly_income {
        Some(income) if income > 0.0 => {
            let ratio = round_to(total_emi / income * 100.0, 2);
            (Some(ratio), Some(RiskLevel::from_ratio(ratio)))
        }
        _ => (None, None),
    };

    debug!(
        "Multi-loan summary: {} loans, total EMI {}, ratio {:?}",
        results.len(),
        total_emi,
        ratio
    );

    Ok(MultiLoanSummary {
        loans: results,
        total_emi,
        monthly_income,
        emi_to_income_ratio: ratio,
        risk_level,
        advice: risk_level.map(|level| level.advice().to_string()),
    })
}
