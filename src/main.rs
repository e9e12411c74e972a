// src/main.rs
use finance_bot_backend::config::AppConfig;
use finance_bot_backend::routes::{self, AppState};
use finance_bot_backend::services::llm::{build_chat_model, warm_up};
use finance_bot_backend::services::mfapi::{FundDataSource, MfApiClient};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

#[tokio::main]
async fn main() {
    // Initialize the logger
    env_logger::init();
    info!("Logger initialized. Starting the application...");

    let config = AppConfig::from_env();
    info!(
        "Using PORT: {}, fund data from {}, LLM provider {:?}",
        config.port, config.mfapi.base_url, config.llm.provider
    );

    let funds: Arc<dyn FundDataSource> = match MfApiClient::new(&config.mfapi) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to set up fund data client: {}", e);
            std::process::exit(1);
        }
    };

    let model = match build_chat_model(&config.llm) {
        Ok(model) => model,
        Err(e) => {
            error!("Failed to set up chat backend: {}", e);
            std::process::exit(1);
        }
    };
    tokio::spawn(warm_up(model.clone()));

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!("Will bind to: {}", addr);

    // Set up CORS
    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_methods(vec!["GET", "POST", "OPTIONS"]);

    let state = Arc::new(AppState::new(config, funds, model));
    let api = routes::routes(state).with(cors);
    info!("Routes configured successfully with CORS.");

    info!("Starting server on {}", addr);
    warp::serve(api).run(addr).await;
}
