// src/bin/simulate_csv.rs
// Usage: cargo run --bin simulate_csv -- navs.csv [monthly_amount] [years] [sip_day]
// The CSV needs `date,nav` columns with dates as DD-MM-YYYY (mfapi style) or YYYY-MM-DD.
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use finance_bot_backend::models::NavEntry;
use finance_bot_backend::services::mfapi::parse_nav_entry;
use finance_bot_backend::services::round_to;
use finance_bot_backend::services::sip::{absolute_return_percent, annual_return_percent, simulate_nav};
use log::warn;
use serde::Deserialize;
use serde_json::Value;
use std::env;

#[derive(Debug, Deserialize)]
struct Row {
    date: String,
    nav: String,
}

fn parse_row(row: &Row) -> Option<NavEntry> {
    if let Ok(date) = NaiveDate::parse_from_str(row.date.trim(), "%Y-%m-%d") {
        let nav: f64 = row.nav.trim().parse().ok()?;
        return (nav > 0.0).then_some(NavEntry { date, nav });
    }
    parse_nav_entry(&row.date, &Value::String(row.nav.clone()))
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let path = match args.first() {
        Some(path) => path.clone(),
        None => bail!("usage: simulate_csv <navs.csv> [monthly_amount] [years] [sip_day]"),
    };
    let monthly_amount = args.get(1).map(|s| s.parse::<f64>()).transpose().context("monthly_amount")?.unwrap_or(5000.0);
    let years = args.get(2).map(|s| s.parse::<f64>()).transpose().context("years")?.unwrap_or(3.0);
    let sip_day = args.get(3).map(|s| s.parse::<u32>()).transpose().context("sip_day")?.unwrap_or(5);

    let mut reader = csv::Reader::from_path(&path).with_context(|| format!("opening {}", path))?;
    let mut navs = Vec::new();
    for (line, record) in reader.deserialize::<Row>().enumerate() {
        let row = record.with_context(|| format!("reading row {}", line + 2))?;
        match parse_row(&row) {
            Some(entry) => navs.push(entry),
            None => warn!("Skipping row {}: {:?}", line + 2, row),
        }
    }
    if navs.is_empty() {
        bail!("{} has no usable NAV rows", path);
    }

    let sim = simulate_nav(&navs, monthly_amount, sip_day, years);
    println!("NAV rows:        {}", navs.len());
    println!("Installments:    {}", sim.installments);
    println!("Last purchase:   {:?}", sim.last_purchase_date);
    println!("Invested:        {:.2}", sim.invested);
    println!("Units:           {:.4}", sim.units);
    println!("Latest NAV:      {:.4}", sim.latest_nav);
    println!("Current value:   {:.2}", sim.value);
    println!("Absolute return: {}%", round_to(absolute_return_percent(sim.invested, sim.value), 2));
    println!("Annual return:   {}%", round_to(annual_return_percent(sim.invested, sim.value, years), 2));
    Ok(())
}
