// src/bin/test_mfapi.rs
// Usage: cargo run --bin test_mfapi -- "<fund name>" [monthly_amount] [years] [sip_day]
use anyhow::{Context, Result};
use finance_bot_backend::config::AppConfig;
use finance_bot_backend::models::SipRequest;
use finance_bot_backend::services::mfapi::{FundDataSource, MfApiClient};
use finance_bot_backend::services::scheme_lookup::find_scheme_by_name;
use finance_bot_backend::services::sip::calculate_sip;
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let config = AppConfig::from_env();

    let args: Vec<String> = env::args().skip(1).collect();
    let name = args.first().cloned().unwrap_or_else(|| "Parag Parikh Flexi Cap".to_string());
    let monthly_amount = args.get(1).map(|s| s.parse::<f64>()).transpose().context("monthly_amount")?.unwrap_or(5000.0);
    let years = args.get(2).map(|s| s.parse::<f64>()).transpose().context("years")?.unwrap_or(3.0);
    let sip_day = args.get(3).map(|s| s.parse::<u32>()).transpose().context("sip_day")?.unwrap_or(5);

    let client = MfApiClient::new(&config.mfapi)?;

    let found = find_scheme_by_name(&client, &name, config.match_min_score).await?;
    println!("Match:        {} ({}) score {:.1}", found.scheme_name, found.scheme_code, found.score);

    let history = client.fetch_history(&found.scheme_code).await?;
    println!("Category:     {}", history.meta.scheme_category);
    println!("NAV entries:  {}", history.navs.len());
    if let (Some(first), Some(last)) = (history.navs.first(), history.latest()) {
        println!("Range:        {} .. {} (latest NAV {})", first.date, last.date, last.nav);
    }

    let request = SipRequest {
        scheme_code: Some(found.scheme_code.clone()),
        scheme_name: None,
        monthly_amount,
        years,
        sip_day,
        expected_return: 12.0,
        use_nav_history: true,
    };
    let result = calculate_sip(&client, config.match_min_score, &request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
