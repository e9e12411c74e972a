// src/services/sip.rs
use chrono::{Datelike, NaiveDate};
use log::{info, warn};

use crate::models::{FundHistory, NavEntry, SipRequest, SipResult};
use crate::services::error::{Result, ServiceError};
use crate::services::mfapi::FundDataSource;
use crate::services::round_to;
use crate::services::scheme_lookup::find_scheme_by_name;

pub const FORMULA_MODE_SCHEME: &str = "N/A (Formula Mode — no NAV used)";

#[derive(Debug, Clone, PartialEq)]
pub struct FormulaProjection {
    pub installments: u32,
    pub invested: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavSimulation {
    pub installments: u32,
    pub invested: f64,
    pub units: f64,
    pub latest_nav: f64,
    pub value: f64,
    pub last_purchase_date: Option<NaiveDate>,
}

/// Number of monthly contributions in a horizon: floor(years * 12).
pub fn planned_installments(years: f64) -> u32 {
    if years <= 0.0 {
        0
    } else {
        (years * 12.0).floor() as u32
    }
}

/// Annuity-due projection: every contribution is made at the start of its month.
/// FV = M * ((1 + r)^n - 1) * (1 + r) / r
pub fn project_formula(monthly_amount: f64, years: f64, annual_return: f64) -> FormulaProjection {
    let n = planned_installments(years);
    let r = annual_return / 12.0 / 100.0;
    let invested = monthly_amount * n as f64;

    let value = if r == 0.0 {
        invested
    } else {
        monthly_amount * ((1.0 + r).powf(n as f64) - 1.0) * (1.0 + r) / r
    };

    FormulaProjection { installments: n, invested, value }
}

/// Walks the NAV history oldest first and buys on every entry dated on `sip_day`,
/// up to floor(years * 12) purchases. Holdings are valued at the newest NAV in
/// the full history, which may be later than the last purchase.
pub fn simulate_nav(navs: &[NavEntry], monthly_amount: f64, sip_day: u32, years: f64) -> NavSimulation {
    let mut ordered: Vec<&NavEntry> = navs.iter().collect();
    ordered.sort_by_key(|entry| entry.date);

    let target = planned_installments(years);
    let latest_nav = ordered.last().map(|entry| entry.nav).unwrap_or(0.0);

    let mut installments = 0u32;
    let mut units = 0.0;
    let mut invested = 0.0;
    let mut last_purchase_date = None;

    for entry in ordered {
        if installments >= target {
            break;
        }
        if entry.date.day() != sip_day || entry.nav <= 0.0 {
            continue;
        }

        units += monthly_amount / entry.nav;
        invested += monthly_amount;
        installments += 1;
        last_purchase_date = Some(entry.date);
    }

    if installments < target {
        warn!(
            "History covers only {} of {} planned installments on day {}",
            installments, target, sip_day
        );
    }

    NavSimulation {
        installments,
        invested,
        units,
        latest_nav,
        value: units * latest_nav,
        last_purchase_date,
    }
}

pub fn absolute_return_percent(invested: f64, value: f64) -> f64 {
    if invested == 0.0 {
        0.0
    } else {
        (value - invested) / invested * 100.0
    }
}

/// Compound annual growth of the whole position over the requested horizon.
pub fn annual_return_percent(invested: f64, value: f64, years: f64) -> f64 {
    if invested <= 0.0 || years <= 0.0 {
        0.0
    } else {
        ((value / invested).powf(1.0 / years) - 1.0) * 100.0
    }
}

pub fn formula_result(req: &SipRequest) -> SipResult {
    let projection = project_formula(req.monthly_amount, req.years, req.expected_return);
    let profit = projection.value - projection.invested;

    SipResult {
        scheme_name: FORMULA_MODE_SCHEME.to_string(),
        scheme_category: "N/A".to_string(),
        scheme_type: "N/A".to_string(),
        total_invested: round_to(projection.invested, 2),
        current_value: round_to(projection.value, 2),
        profit: round_to(profit, 2),
        absolute_return_percent: round_to(absolute_return_percent(projection.invested, projection.value), 2),
        annual_return_percent: round_to(
            annual_return_percent(projection.invested, projection.value, req.years),
            2,
        ),
        total_units: 0.0,
        latest_nav: 0.0,
        installments: projection.installments,
        planned_installments: projection.installments,
        last_purchase_date: None,
    }
}

pub fn nav_result(history: &FundHistory, req: &SipRequest) -> SipResult {
    let sim = simulate_nav(&history.navs, req.monthly_amount, req.sip_day, req.years);
    let profit = sim.value - sim.invested;

    SipResult {
        scheme_name: history.meta.scheme_name.clone(),
        scheme_category: history.meta.scheme_category.clone(),
        scheme_type: history.meta.scheme_type.clone(),
        total_invested: round_to(sim.invested, 2),
        current_value: round_to(sim.value, 2),
        profit: round_to(profit, 2),
        absolute_return_percent: round_to(absolute_return_percent(sim.invested, sim.value), 2),
        annual_return_percent: round_to(annual_return_percent(sim.invested, sim.value, req.years), 2),
        total_units: round_to(sim.units, 4),
        latest_nav: round_to(sim.latest_nav, 2),
        installments: sim.installments,
        planned_installments: planned_installments(req.years),
        last_purchase_date: sim.last_purchase_date,
    }
}

/// Full SIP pipeline: validate, resolve the scheme when only a name is given,
/// fetch its history once and simulate. Formula mode never touches the network.
pub async fn calculate_sip(source: &dyn FundDataSource, min_score: f64, req: &SipRequest) -> Result<SipResult> {
    req.validate()?;

    if !req.use_nav_history {
        info!("Formula SIP: {} x {} years at {}%", req.monthly_amount, req.years, req.expected_return);
        return ensure_finite(formula_result(req));
    }

    // validate() guarantees a code or a name in nav mode.
    let scheme_code = match req.scheme_code() {
        Some(code) => code.to_string(),
        None => {
            let name = req.scheme_name().unwrap_or_default();
            find_scheme_by_name(source, name, min_score).await?.scheme_code
        }
    };

    let history = source.fetch_history(&scheme_code).await?;
    info!(
        "NAV SIP on {} ({}): {} NAV entries, day {}",
        history.meta.scheme_name,
        scheme_code,
        history.navs.len(),
        req.sip_day
    );

    ensure_finite(nav_result(&history, req))
}

/// Rejects results whose figures overflowed; serde would emit them as `null`.
pub fn ensure_finite(result: SipResult) -> Result<SipResult> {
    let figures = [
        result.total_invested,
        result.current_value,
        result.profit,
        result.absolute_return_percent,
        result.annual_return_percent,
        result.total_units,
        result.latest_nav,
    ];
    if figures.iter().all(|v| v.is_finite()) {
        Ok(result)
    } else {
        Err(ServiceError::invalid(
            "monthly_amount and years are too large to compute a finite projection",
        ))
    }
}
