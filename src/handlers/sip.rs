// src/handlers/sip.rs
use log::info;
use std::sync::Arc;
use warp::reply::Json;
use warp::Rejection;

use super::error::reject;
use crate::models::SipRequest;
use crate::routes::AppState;
use crate::services::sip::calculate_sip;

pub async fn calculate(body: SipRequest, state: Arc<AppState>) -> Result<Json, Rejection> {
    info!(
        "Handling SIP request (nav history: {}, scheme: {:?})",
        body.use_nav_history,
        body.scheme_code().or(body.scheme_name())
    );

    let result = calculate_sip(state.funds.as_ref(), state.config.match_min_score, &body)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&result))
}
