// src/handlers/chat.rs
use log::info;
use std::sync::Arc;
use warp::reply::Json;
use warp::Rejection;

use super::error::reject;
use crate::models::{ChatRequest, ChatResponse};
use crate::routes::AppState;

pub async fn chat(body: ChatRequest, state: Arc<AppState>) -> Result<Json, Rejection> {
    info!("Handling chat request (context: {})", body.context_type);

    let reply = state.assistant.respond(&body).await.map_err(reject)?;
    Ok(warp::reply::json(&ChatResponse { reply }))
}
