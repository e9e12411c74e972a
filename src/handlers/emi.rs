// src/handlers/emi.rs
use log::info;
use serde_json::json;
use warp::reply::Json;
use warp::Rejection;

use super::error::reject;
use crate::models::{EmiMultiRequest, EmiSingleRequest};
use crate::services::emi::{calculate_multi_emi, checked_emi};

pub async fn single_emi(body: EmiSingleRequest) -> Result<Json, Rejection> {
    info!("Handling single EMI request.");
    body.validate().map_err(reject)?;

    let emi = checked_emi(body.principal, body.annual_rate, body.tenure_months).map_err(reject)?;
    Ok(warp::reply::json(&json!({
        "emi": emi,
        "principal": body.principal,
        "annual_rate": body.annual_rate,
        "tenure_months": body.tenure_months,
    })))
}

pub async fn multi_emi(body: EmiMultiRequest) -> Result<Json, Rejection> {
    info!("Handling multi-loan EMI request for {} loans.", body.loans.len());
    body.validate().map_err(reject)?;

    let summary = calculate_multi_emi(&body.loans, body.monthly_income).map_err(reject)?;
    Ok(warp::reply::json(&summary))
}
