// tests/api.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use finance_bot_backend::config::AppConfig;
use finance_bot_backend::models::{ChatTurn, FundHistory, FundMeta, FundRecord, NavEntry};
use finance_bot_backend::routes::{routes, AppState};
use finance_bot_backend::services::error::{Result, ServiceError};
use finance_bot_backend::services::llm::{ChatModel, APOLOGY};
use finance_bot_backend::services::mfapi::FundDataSource;
use serde_json::{json, Value};
use std::sync::Arc;
use warp::http::StatusCode;

struct StubFunds;

#[async_trait]
impl FundDataSource for StubFunds {
    async fn fetch_catalog(&self) -> Result<Vec<FundRecord>> {
        Ok(vec![
            FundRecord {
                scheme_code: "120465".to_string(),
                scheme_name: "Axis Bluechip Fund - Direct Plan - Growth".to_string(),
            },
            FundRecord {
                scheme_code: "122639".to_string(),
                scheme_name: "Parag Parikh Flexi Cap Fund - Direct Plan - Growth".to_string(),
            },
        ])
    }

    async fn fetch_history(&self, scheme_code: &str) -> Result<FundHistory> {
        match scheme_code {
            "120465" => {
                let start = NaiveDate::from_ymd_opt(2021, 1, 5).unwrap();
                let navs = (0..36)
                    .map(|i| NavEntry {
                        date: start.checked_add_months(chrono::Months::new(i)).unwrap(),
                        nav: 20.0 + i as f64,
                    })
                    .collect();
                Ok(FundHistory {
                    scheme_code: scheme_code.to_string(),
                    meta: FundMeta {
                        scheme_name: "Axis Bluechip Fund - Direct Plan - Growth".to_string(),
                        scheme_category: "Equity Scheme - Large Cap Fund".to_string(),
                        scheme_type: "Open Ended Schemes".to_string(),
                        fund_house: Some("Axis Mutual Fund".to_string()),
                    },
                    navs,
                })
            }
            "504" => Err(ServiceError::UpstreamTimeout("NAV history: operation timed out".to_string())),
            "502" => Err(ServiceError::Upstream("NAV history returned HTTP 503".to_string())),
            other => Err(ServiceError::DataUnavailable(format!("Unknown scheme {}", other))),
        }
    }
}

/// Answers intent extraction with a fixed JSON reply and everything else with "explained".
struct StubModel {
    intent_reply: Option<String>,
}

#[async_trait]
impl ChatModel for StubModel {
    fn name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, turns: &[ChatTurn]) -> Result<String> {
        let extracting = turns.first().map_or(false, |t| t.content.contains("strict JSON"));
        match (&self.intent_reply, extracting) {
            (None, _) => Err(ServiceError::Upstream("llm offline".to_string())),
            (Some(reply), true) => Ok(reply.clone()),
            (Some(_), false) => Ok("explained".to_string()),
        }
    }
}

fn api(intent_reply: Option<&str>) -> impl warp::Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
    let state = AppState::new(
        AppConfig::default(),
        Arc::new(StubFunds),
        Arc::new(StubModel { intent_reply: intent_reply.map(str::to_string) }),
    );
    routes(Arc::new(state))
}

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_root_reports_running() {
    let resp = warp::test::request().method("GET").path("/").reply(&api(None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp.body()), json!({"message": "Finance Bot Backend is running"}));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let resp = warp::test::request().method("GET").path("/nope").reply(&api(None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp.body())["error"], "Not Found");
}

#[tokio::test]
async fn test_single_emi() {
    let resp = warp::test::request()
        .method("POST")
        .path("/emi/single")
        .json(&json!({"principal": 1_000_000.0, "annual_rate": 8.0, "tenure_months": 120}))
        .reply(&api(None))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.body());
    assert_eq!(body["emi"], json!(12132.76));
    assert_eq!(body["tenure_months"], json!(120));
}

#[tokio::test]
async fn test_single_emi_rejects_bad_input() {
    let resp = warp::test::request()
        .method("POST")
        .path("/emi/single")
        .json(&json!({"principal": -5.0, "annual_rate": 8.0, "tenure_months": 120}))
        .reply(&api(None))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp.body())["error"], "principal must be greater than 0");
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let resp = warp::test::request()
        .method("POST")
        .path("/emi/single")
        .header("content-type", "application/json")
        .body("{\"principal\": ")
        .reply(&api(None))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_multi_emi_risk() {
    let resp = warp::test::request()
        .method("POST")
        .path("/emi/multi")
        .json(&json!({
            "loans": [
                {"loan_type": "home", "principal": 1_000_000.0, "annual_rate": 8.0, "tenure_months": 120}
            ],
            "monthly_income": 20000.0
        }))
        .reply(&api(None))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.body());
    assert_eq!(body["total_emi"], json!(12132.76));
    assert_eq!(body["emi_to_income_ratio"], json!(60.66));
    assert_eq!(body["risk_level"], "high");
    assert_eq!(body["loans"][0]["loan_type"], "home");
}

#[tokio::test]
async fn test_multi_emi_needs_a_loan() {
    let resp = warp::test::request()
        .method("POST")
        .path("/emi/multi")
        .json(&json!({"loans": []}))
        .reply(&api(None))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sip_formula_mode() {
    let resp = warp::test::request()
        .method("POST")
        .path("/sip/calculate")
        .json(&json!({"monthly_amount": 5000.0, "years": 10.0, "use_nav_history": false}))
        .reply(&api(None))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.body());
    assert_eq!(body["scheme_name"], "N/A (Formula Mode — no NAV used)");
    assert_eq!(body["total_invested"], json!(600000.0));
    assert_eq!(body["current_value"], json!(1161695.38));
}

#[tokio::test]
async fn test_sip_by_name_uses_history() {
    let resp = warp::test::request()
        .method("POST")
        .path("/sip/calculate")
        .json(&json!({"scheme_name": "axis bluechip", "monthly_amount": 1000.0, "years": 2.0}))
        .reply(&api(None))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.body());
    assert_eq!(body["scheme_category"], "Equity Scheme - Large Cap Fund");
    assert_eq!(body["installments"], json!(24));
    assert_eq!(body["total_invested"], json!(24000.0));
    assert_eq!(body["latest_nav"], json!(55.0));
    assert_eq!(body["last_purchase_date"], "2022-12-05");
}

#[tokio::test]
async fn test_sip_requires_a_scheme_in_nav_mode() {
    let resp = warp::test::request()
        .method("POST")
        .path("/sip/calculate")
        .json(&json!({"monthly_amount": 1000.0, "years": 2.0}))
        .reply(&api(None))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(resp.body())["error"],
        "Please provide either scheme_name or scheme_code."
    );
}

#[tokio::test]
async fn test_sip_unknown_scheme_code_is_500() {
    let resp = warp::test::request()
        .method("POST")
        .path("/sip/calculate")
        .json(&json!({"scheme_code": "999999", "monthly_amount": 1000.0, "years": 2.0}))
        .reply(&api(None))
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_fund_search() {
    let resp = warp::test::request()
        .method("GET")
        .path("/funds/search?q=parag%20parikh%20flexi")
        .reply(&api(None))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp.body())["scheme_code"], "122639");
}

#[tokio::test]
async fn test_fund_search_without_match_is_500() {
    let resp = warp::test::request()
        .method("GET")
        .path("/funds/search?q=zzzz%20qqqq")
        .reply(&api(None))
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_fund_search_blank_query_is_400() {
    let resp = warp::test::request().method("GET").path("/funds/search").reply(&api(None)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fund_history() {
    let resp = warp::test::request().method("GET").path("/funds/120465").reply(&api(None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp.body());
    assert_eq!(body["meta"]["fund_house"], "Axis Mutual Fund");
    assert_eq!(body["navs"].as_array().map(Vec::len), Some(36));
    assert_eq!(body["navs"][0]["date"], "2021-01-05");
}

#[tokio::test]
async fn test_fund_history_upstream_statuses() {
    let timeout = warp::test::request().method("GET").path("/funds/504").reply(&api(None)).await;
    assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

    let upstream = warp::test::request().method("GET").path("/funds/502").reply(&api(None)).await;
    assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);

    let missing = warp::test::request().method("GET").path("/funds/42").reply(&api(None)).await;
    assert_eq!(missing.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_chat_apologizes_when_model_is_down() {
    let resp = warp::test::request()
        .method("POST")
        .path("/chat")
        .json(&json!({"message": "What is an index fund?"}))
        .reply(&api(None))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp.body()), json!({"reply": APOLOGY}));
}

#[tokio::test]
async fn test_chat_emi_intent() {
    let intent = r#"{"intent": "emi", "loan_amount": 500000, "interest_rate": "9", "tenure_years": 5}"#;
    let resp = warp::test::request()
        .method("POST")
        .path("/chat")
        .json(&json!({"message": "EMI on 5 lakh at 9% for 5 years", "context_type": "emi"}))
        .reply(&api(Some(intent)))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp.body())["reply"], "explained");
}

#[tokio::test]
async fn test_chat_blank_message_is_400() {
    let resp = warp::test::request()
        .method("POST")
        .path("/chat")
        .json(&json!({"message": "  "}))
        .reply(&api(Some("{}")))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sip_overflowing_horizon_is_400() {
    let resp = warp::test::request()
        .method("POST")
        .path("/sip/calculate")
        .json(&json!({"monthly_amount": 1000.0, "years": 1_000_000.0, "use_nav_history": false}))
        .reply(&api(None))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(resp.body())["error"].as_str().unwrap().contains("finite"));
}

#[tokio::test]
async fn test_emi_overflowing_tenure_is_400() {
    let single = warp::test::request()
        .method("POST")
        .path("/emi/single")
        .json(&json!({"principal": 1000.0, "annual_rate": 8.0, "tenure_months": 4_000_000_000u32}))
        .reply(&api(None))
        .await;
    assert_eq!(single.status(), StatusCode::BAD_REQUEST);

    let multi = warp::test::request()
        .method("POST")
        .path("/emi/multi")
        .json(&json!({"loans": [{"principal": 1000.0, "annual_rate": 8.0, "tenure_months": 4_000_000_000u32}]}))
        .reply(&api(None))
        .await;
    assert_eq!(multi.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(multi.body())["error"],
        "loan 1: loan terms are too large to compute a finite EMI"
    );
}
