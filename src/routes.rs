// src/routes.rs
use log::{error, info};
use std::convert::Infallible;
use std::error::Error;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reject::Rejection;
use warp::{Filter, Reply};

use crate::config::AppConfig;
use crate::handlers::error::ApiError;
use crate::handlers::{chat, emi, funds, sip};
use crate::models::SchemeCode;
use crate::services::chat::ChatAssistant;
use crate::services::llm::ChatModel;
use crate::services::mfapi::FundDataSource;

const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Shared, read-only state handed to every handler.
pub struct AppState {
    pub config: AppConfig,
    pub funds: Arc<dyn FundDataSource>,
    pub assistant: ChatAssistant,
}

impl AppState {
    pub fn new(config: AppConfig, funds: Arc<dyn FundDataSource>, model: Arc<dyn ChatModel>) -> Self {
        let assistant = ChatAssistant::new(model, funds.clone(), config.match_min_score);
        Self { config, funds, assistant }
    }
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message: String;

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        message = "Not Found".to_string();
    } else if let Some(api_error) = err.find::<ApiError>() {
        code = api_error.status;
        message = api_error.message.clone();
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        code = StatusCode::BAD_REQUEST;
        message = e
            .source()
            .map(|cause| cause.to_string())
            .unwrap_or_else(|| "Invalid request body".to_string());
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        code = StatusCode::BAD_REQUEST;
        message = "Invalid query string".to_string();
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        code = StatusCode::PAYLOAD_TOO_LARGE;
        message = "Request body too large".to_string();
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        code = StatusCode::LENGTH_REQUIRED;
        message = "Content-Length header is required".to_string();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        message = "Method Not Allowed".to_string();
    } else {
        error!("Unhandled rejection: {:?}", err);
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal Server Error".to_string();
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": message,
        })),
        code,
    ))
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

pub fn routes(state: Arc<AppState>) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    info!("Configuring routes...");

    let state_filter = warp::any().map(move || state.clone());

    let health_route = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({ "message": "Finance Bot Backend is running" })));

    let emi_single_route = warp::path!("emi" / "single")
        .and(warp::post())
        .and(json_body())
        .and_then(emi::single_emi);

    let emi_multi_route = warp::path!("emi" / "multi")
        .and(warp::post())
        .and(json_body())
        .and_then(emi::multi_emi);

    let sip_route = warp::path!("sip" / "calculate")
        .and(warp::post())
        .and(json_body())
        .and(state_filter.clone())
        .and_then(sip::calculate);

    let fund_search_route = warp::path!("funds" / "search")
        .and(warp::get())
        .and(warp::query())
        .and(state_filter.clone())
        .and_then(funds::search);

    let fund_history_route = warp::path!("funds" / SchemeCode)
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(funds::history);

    let chat_route = warp::path!("chat")
        .and(warp::post())
        .and(json_body())
        .and(state_filter.clone())
        .and_then(chat::chat);

    info!("All routes configured successfully.");

    health_route
        .or(emi_single_route)
        .or(emi_multi_route)
        .or(sip_route)
        .or(fund_search_route)
        .or(fund_history_route)
        .or(chat_route)
        .recover(handle_rejection)
}
