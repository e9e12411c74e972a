// src/handlers/funds.rs
use log::info;
use std::sync::Arc;
use warp::reply::Json;
use warp::Rejection;

use super::error::reject;
use crate::models::{FundSearchQuery, SchemeCode};
use crate::routes::AppState;
use crate::services::scheme_lookup::find_scheme_by_name;

pub async fn search(query: FundSearchQuery, state: Arc<AppState>) -> Result<Json, Rejection> {
    info!("Handling fund search for '{}'", query.q);

    let found = find_scheme_by_name(state.funds.as_ref(), &query.q, state.config.match_min_score)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&found))
}

pub async fn history(scheme_code: SchemeCode, state: Arc<AppState>) -> Result<Json, Rejection> {
    info!("Handling NAV history request for {}", scheme_code.0);

    let history = state.funds.fetch_history(&scheme_code.0).await.map_err(reject)?;
    Ok(warp::reply::json(&history))
}
