// src/services/chat.rs
//! Single chat orchestration path: extract an intent with the LLM, run the
//! matching engine in-process, and let the LLM phrase the figures.

use chrono::Duration;
use log::{info, warn};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::models::{ChatRequest, ChatTurn, FundHistory, LoanInput, SipRequest};
use crate::services::emi::calculate_multi_emi;
use crate::services::error::{Result, ServiceError};
use crate::services::llm::{complete_or_apologize, ChatModel};
use crate::services::mfapi::FundDataSource;
use crate::services::round_to;
use crate::services::scheme_lookup::find_scheme_by_name;
use crate::services::sip::calculate_sip;

const DEFAULT_SIP_DAY: u32 = 5;
const DEFAULT_EXPECTED_RETURN: f64 = 12.0;

fn assistant_prompt() -> &'static str {
    "You are NiveshBuddy, a helpful Indian personal finance assistant. \
     You explain EMIs, SIPs, budgeting and investments in simple, plain English. \
     You are not a SEBI-registered advisor; avoid specific stock recommendations. \
     When numbers are provided, use them and add a short risk note."
}

fn extraction_prompt() -> &'static str {
    "Read the user's message and reply with strict JSON only, no explanation:\n\
     {\"intent\": \"emi\" | \"sip\" | \"mf\" | \"general\", \"loan_amount\": number|null, \
     \"interest_rate\": number|null, \"tenure_years\": number|null, \"monthly_amount\": number|null, \
     \"years\": number|null, \"expected_return\": number|null, \"scheme_name\": string|null, \
     \"income\": number|null}\n\
     emi = loan instalments; sip = monthly investing; mf = mutual fund questions; general = anything else. \
     Copy fund names exactly as written. Use null when unsure."
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Emi,
    Sip,
    FundInfo,
    General,
}

impl Intent {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "emi" | "loan" => Intent::Emi,
            "sip" => Intent::Sip,
            "mf" | "fund" | "fund-info" | "fund_info" | "mutual_fund" => Intent::FundInfo,
            _ => Intent::General,
        }
    }
}

/// Intent plus whatever figures the LLM could pull out of the message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIntent {
    pub intent: Intent,
    pub loan_amount: Option<f64>,
    pub interest_rate: Option<f64>,
    pub tenure_years: Option<f64>,
    pub monthly_amount: Option<f64>,
    pub years: Option<f64>,
    pub expected_return: Option<f64>,
    pub scheme_name: Option<String>,
    pub income: Option<f64>,
}

impl ParsedIntent {
    pub fn general() -> Self {
        ParsedIntent {
            intent: Intent::General,
            loan_amount: None,
            interest_rate: None,
            tenure_years: None,
            monthly_amount: None,
            years: None,
            expected_return: None,
            scheme_name: None,
            income: None,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        let intent = Intent::parse(value.get("intent")?.as_str()?);
        Some(ParsedIntent {
            intent,
            loan_amount: number(value, "loan_amount"),
            interest_rate: number(value, "interest_rate"),
            tenure_years: number(value, "tenure_years"),
            monthly_amount: number(value, "monthly_amount"),
            years: number(value, "years"),
            expected_return: number(value, "expected_return"),
            scheme_name: value
                .get("scheme_name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            income: number(value, "income"),
        })
    }
}

// Numbers may come back as JSON numbers or as strings like "8.5" / "10,00,000".
fn number(value: &Value, key: &str) -> Option<f64> {
    let parsed = match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    }?;
    if parsed.is_finite() {
        Some(parsed)
    } else {
        None
    }
}

/// Pulls the first complete `{...}` object out of an LLM reply (code fences and prose tolerated).
pub fn extract_json_object(reply: &str) -> Option<Value> {
    let starts = Regex::new(r"\{").ok()?;
    let found = starts.find_iter(reply).find_map(|m| {
        // Streaming parse stops at the end of the first value, so trailing text is ignored.
        match serde_json::Deserializer::from_str(&reply[m.start()..])
            .into_iter::<Value>()
            .next()
        {
            Some(Ok(value @ Value::Object(_))) => Some(value),
            _ => None,
        }
    });
    found
}

/// Falls back to a general intent when the reply is not usable JSON.
pub fn parse_intent_reply(reply: &str) -> ParsedIntent {
    match extract_json_object(reply).as_ref().and_then(ParsedIntent::from_value) {
        Some(parsed) => parsed,
        None => {
            warn!("Intent reply was not usable JSON, treating as general: {:?}", reply);
            ParsedIntent::general()
        }
    }
}

/// Income bucket and the monthly SIP budget it suggests.
pub fn income_profile(income: f64) -> (&'static str, f64) {
    if income < 30_000.0 {
        ("conservative", income * 0.10)
    } else if income < 100_000.0 {
        ("moderate", income * 0.15)
    } else {
        ("growth", income * 0.20)
    }
}

/// Latest NAV and trailing one-year change for a fund, as handed to the LLM.
pub fn fund_snapshot(history: &FundHistory) -> Value {
    let latest = history.latest();
    let one_year_return = latest.and_then(|last| {
        let cutoff = last.date - Duration::days(365);
        let base = history.navs.iter().rev().find(|e| e.date <= cutoff)?;
        Some(round_to((last.nav / base.nav - 1.0) * 100.0, 2))
    });

    json!({
        "scheme_code": history.scheme_code,
        "scheme_name": history.meta.scheme_name,
        "scheme_category": history.meta.scheme_category,
        "scheme_type": history.meta.scheme_type,
        "fund_house": history.meta.fund_house,
        "latest_nav": latest.map(|e| e.nav),
        "latest_nav_date": latest.map(|e| e.date.to_string()),
        "one_year_return_percent": one_year_return,
    })
}

pub struct ChatAssistant {
    model: Arc<dyn ChatModel>,
    funds: Arc<dyn FundDataSource>,
    min_match_score: f64,
}

impl ChatAssistant {
    pub fn new(model: Arc<dyn ChatModel>, funds: Arc<dyn FundDataSource>, min_match_score: f64) -> Self {
        Self { model, funds, min_match_score }
    }

    async fn ask(&self, instruction: &str, content: String) -> String {
        let system = format!("{} {}", assistant_prompt(), instruction);
        complete_or_apologize(self.model.as_ref(), &[ChatTurn::system(system), ChatTurn::user(content)]).await
    }

    pub async fn extract_intent(&self, request: &ChatRequest) -> ParsedIntent {
        let mut system = extraction_prompt().to_string();
        let context = request.context_type.trim();
        if !context.is_empty() && !context.eq_ignore_ascii_case("general") {
            system.push_str(&format!("\nThe user opened the {} tool.", context));
        }

        match self
            .model
            .complete(&[ChatTurn::system(system), ChatTurn::user(request.message.clone())])
            .await
        {
            Ok(reply) => parse_intent_reply(&reply),
            Err(e) => {
                warn!("Intent extraction failed: {}", e);
                ParsedIntent::general()
            }
        }
    }

    /// Answers one chat message. Only a blank message is an error; every
    /// upstream failure turns into a degraded reply instead.
    pub async fn respond(&self, request: &ChatRequest) -> Result<String> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(ServiceError::invalid("message must not be empty"));
        }

        let parsed = self.extract_intent(request).await;
        info!("Chat intent: {:?}", parsed.intent);

        let reply = match parsed.intent {
            Intent::Emi => self.emi_reply(&parsed, message).await,
            Intent::Sip => self.sip_reply(&parsed, message).await,
            Intent::FundInfo => self.fund_reply(&parsed, message).await,
            Intent::General => {
                complete_or_apologize(
                    self.model.as_ref(),
                    &[ChatTurn::system(assistant_prompt()), ChatTurn::user(message)],
                )
                .await
            }
        };
        Ok(reply)
    }

    async fn emi_reply(&self, parsed: &ParsedIntent, message: &str) -> String {
        let loan = match (parsed.loan_amount, parsed.interest_rate, parsed.tenure_years) {
            (Some(principal), Some(rate), Some(years)) if years > 0.0 => Some(LoanInput {
                loan_type: None,
                principal,
                annual_rate: rate,
                tenure_months: (years * 12.0).round() as u32,
            }),
            _ => None,
        }
        .filter(|loan| loan.validate().is_ok());
        let income = parsed.income.filter(|i| *i > 0.0);
        let computed = loan.and_then(|loan| {
            calculate_multi_emi(std::slice::from_ref(&loan), income)
                .ok()
                .map(|summary| (loan, summary))
        });

        let (loan, summary) = match computed {
            Some(computed) => computed,
            None => {
                return self
                    .ask(
                        "The user wants an EMI calculation but did not give enough numbers. \
                         Politely ask for the loan amount, yearly interest rate and tenure in years.",
                        message.to_string(),
                    )
                    .await
            }
        };

        let emi = summary.total_emi;
        let total_payment = round_to(emi * loan.tenure_months as f64, 2);
        let figures = json!({
            "loan_amount": loan.principal,
            "annual_interest_rate": loan.annual_rate,
            "tenure_months": loan.tenure_months,
            "emi": emi,
            "total_payment": total_payment,
            "total_interest": round_to(total_payment - loan.principal, 2),
            "emi_to_income_ratio": summary.emi_to_income_ratio,
            "risk_level": summary.risk_level,
            "advice": summary.advice,
        });

        self.ask(
            "You already have the EMI figures below. Explain them in 1-2 short paragraphs; do not show raw JSON.",
            figures.to_string(),
        )
        .await
    }

    async fn sip_reply(&self, parsed: &ParsedIntent, message: &str) -> String {
        let request = match (parsed.monthly_amount, parsed.years) {
            (Some(monthly_amount), Some(years)) => SipRequest {
                scheme_code: None,
                scheme_name: parsed.scheme_name.clone(),
                monthly_amount,
                years,
                sip_day: DEFAULT_SIP_DAY,
                expected_return: parsed
                    .expected_return
                    .filter(|r| *r >= 0.0)
                    .unwrap_or(DEFAULT_EXPECTED_RETURN),
                use_nav_history: parsed.scheme_name.is_some(),
            },
            _ => SipRequest {
                scheme_code: None,
                scheme_name: None,
                monthly_amount: 0.0,
                years: 0.0,
                sip_day: DEFAULT_SIP_DAY,
                expected_return: DEFAULT_EXPECTED_RETURN,
                use_nav_history: false,
            },
        };

        if request.validate().is_err() {
            return self
                .ask(
                    "The user wants a SIP calculation but did not give enough numbers. \
                     Ask for the monthly amount, number of years and (optionally) expected return %.",
                    message.to_string(),
                )
                .await;
        }

        let outcome = calculate_sip(self.funds.as_ref(), self.min_match_score, &request).await;
        let result = match outcome {
            Ok(result) => result,
            Err(e) if request.use_nav_history => {
                warn!("NAV-based SIP failed, falling back to formula projection: {}", e);
                let formula = SipRequest { use_nav_history: false, ..request };
                match calculate_sip(self.funds.as_ref(), self.min_match_score, &formula).await {
                    Ok(result) => result,
                    Err(e) => return self.sip_follow_up(&e, message).await,
                }
            }
            Err(e) => return self.sip_follow_up(&e, message).await,
        };

        let figures = serde_json::to_string(&result).unwrap_or_default();
        self.ask(
            "You already have the SIP figures below. Explain them in 1-2 short paragraphs and a short bullet summary; \
             do not show raw JSON.",
            figures,
        )
        .await
    }

    async fn sip_follow_up(&self, err: &ServiceError, message: &str) -> String {
        warn!("SIP projection unavailable: {}", err);
        self.ask(
            "The SIP figures could not be computed from the numbers given. \
             Ask the user to check the monthly amount and number of years.",
            message.to_string(),
        )
        .await
    }

    async fn fund_reply(&self, parsed: &ParsedIntent, message: &str) -> String {
        let fund = match &parsed.scheme_name {
            Some(name) => self.lookup_fund(name).await,
            None => None,
        };
        let income = parsed.income.filter(|i| *i > 0.0);

        match (income, fund) {
            (Some(income), fund) => {
                let (profile, budget) = income_profile(income);
                let data = json!({
                    "income": income,
                    "profile": profile,
                    "monthly_sip_budget": round_to(budget, 2),
                    "found_scheme": fund,
                });
                self.ask(
                    "Suggest a short SIP / mutual fund allocation using the data below, \
                     at most 5 items, and end with a short 'next steps' list.",
                    data.to_string(),
                )
                .await
            }
            (None, Some(fund)) => {
                self.ask(
                    "The user asked about a specific mutual fund. Using the live data below, \
                     explain its recent NAV and what an investor should consider. Keep it short.",
                    fund.to_string(),
                )
                .await
            }
            (None, None) => {
                self.ask(
                    "The user wants mutual fund suggestions but gave too few details. Ask for the monthly SIP \
                     amount, investment horizon in years and risk tolerance (low/medium/high).",
                    message.to_string(),
                )
                .await
            }
        }
    }

    async fn lookup_fund(&self, name: &str) -> Option<Value> {
        let found = find_scheme_by_name(self.funds.as_ref(), name, self.min_match_score)
            .await
            .map_err(|e| warn!("Fund lookup for '{}' failed: {}", name, e))
            .ok()?;
        let history = self
            .funds
            .fetch_history(&found.scheme_code)
            .await
            .map_err(|e| warn!("NAV history for {} failed: {}", found.scheme_code, e))
            .ok()?;
        Some(fund_snapshot(&history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FundMeta, FundRecord, NavEntry};
    use crate::services::llm::APOLOGY;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records every prompt it was sent.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String>>>,
        seen: Mutex<Vec<Vec<ChatTurn>>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Scripted { replies: Mutex::new(replies.into()), seen: Mutex::new(Vec::new()) })
        }

        fn last_user_turn(&self) -> String {
            let seen = self.seen.lock().unwrap();
            seen.last().and_then(|turns| turns.last()).map(|t| t.content.clone()).unwrap_or_default()
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, turns: &[ChatTurn]) -> Result<String> {
            self.seen.lock().unwrap().push(turns.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("done".to_string()))
        }
    }

    struct OneFund {
        fail_history: bool,
    }

    #[async_trait]
    impl FundDataSource for OneFund {
        async fn fetch_catalog(&self) -> Result<Vec<FundRecord>> {
            Ok(vec![FundRecord {
                scheme_code: "120465".to_string(),
                scheme_name: "Axis Bluechip Fund - Direct Plan - Growth".to_string(),
            }])
        }

        async fn fetch_history(&self, scheme_code: &str) -> Result<FundHistory> {
            if self.fail_history {
                return Err(ServiceError::UpstreamTimeout("NAV history".to_string()));
            }
            let start = NaiveDate::from_ymd_opt(2022, 1, 5).unwrap();
            let navs = (0..24)
                .map(|i| NavEntry {
                    date: start.checked_add_months(chrono::Months::new(i)).unwrap(),
                    nav: 40.0 + i as f64,
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
    }

    fn assistant(model: Arc<Scripted>, fail_history: bool) -> ChatAssistant {
        ChatAssistant::new(model, Arc::new(OneFund { fail_history }), 50.0)
    }

    fn ask(message: &str) -> ChatRequest {
        ChatRequest { message: message.to_string(), context_type: "general".to_string() }
    }

    #[test]
    fn test_parse_intent_reply_tolerates_fences() {
        let reply = "Sure!\n```json\n{\"intent\": \"emi\", \"loan_amount\": \"10,00,000\", \"interest_rate\": 8, \
                     \"tenure_years\": 10, \"scheme_name\": null}\n```";
        let parsed = parse_intent_reply(reply);
        assert_eq!(parsed.intent, Intent::Emi);
        assert_eq!(parsed.loan_amount, Some(1_000_000.0));
        assert_eq!(parsed.interest_rate, Some(8.0));
        assert_eq!(parsed.scheme_name, None);
    }

    #[test]
    fn test_parse_intent_reply_ignores_braces_after_the_object() {
        let reply = "{\"intent\": \"emi\", \"loan_amount\": 500000, \"interest_rate\": 9, \"tenure_years\": 5}\n\
                     Note: fields use {name} placeholders, e.g. {\"intent\": \"sip\"}.";
        let parsed = parse_intent_reply(reply);
        assert_eq!(parsed.intent, Intent::Emi);
        assert_eq!(parsed.loan_amount, Some(500_000.0));
        assert_eq!(parsed.tenure_years, Some(5.0));
    }

    #[test]
    fn test_extract_json_object_skips_stray_braces_before_the_object() {
        let value = extract_json_object("Using {template}: {\"intent\": \"sip\", \"years\": 3} {").unwrap();
        assert_eq!(value["intent"], "sip");
        assert_eq!(value["years"], json!(3));
        assert!(extract_json_object("no {json} here").is_none());
    }

    #[test]
    fn test_parse_intent_reply_falls_back_to_general() {
        assert_eq!(parse_intent_reply("I think this is about loans"), ParsedIntent::general());
        assert_eq!(parse_intent_reply("{\"loan_amount\": 5}"), ParsedIntent::general());
        assert_eq!(parse_intent_reply("{\"intent\": \"weather\"}").intent, Intent::General);
    }

    #[test]
    fn test_income_profile_buckets() {
        assert_eq!(income_profile(25_000.0), ("conservative", 2_500.0));
        assert_eq!(income_profile(50_000.0), ("moderate", 7_500.0));
        assert_eq!(income_profile(200_000.0), ("growth", 40_000.0));
    }

    #[tokio::test]
    async fn test_emi_intent_sends_computed_figures() {
        let model = Scripted::new(vec![
            Ok(r#"{"intent":"emi","loan_amount":1000000,"interest_rate":8,"tenure_years":10}"#.to_string()),
            Ok("Your EMI is about 12,133.".to_string()),
        ]);
        let reply = assistant(model.clone(), false).respond(&ask("EMI for 10 lakh at 8% for 10 years?")).await.unwrap();
        assert_eq!(reply, "Your EMI is about 12,133.");

        let figures: Value = serde_json::from_str(&model.last_user_turn()).unwrap();
        assert_eq!(figures["emi"], json!(12132.76));
        assert_eq!(figures["tenure_months"], json!(120));
    }

    #[tokio::test]
    async fn test_emi_intent_without_numbers_asks_followup() {
        let model = Scripted::new(vec![
            Ok(r#"{"intent":"emi","loan_amount":null}"#.to_string()),
            Ok("How much would you like to borrow?".to_string()),
        ]);
        let reply = assistant(model.clone(), false).respond(&ask("I need a loan")).await.unwrap();
        assert_eq!(reply, "How much would you like to borrow?");
        assert_eq!(model.last_user_turn(), "I need a loan");
    }

    #[tokio::test]
    async fn test_sip_with_fund_uses_nav_history() {
        let model = Scripted::new(vec![
            Ok(r#"{"intent":"sip","monthly_amount":5000,"years":1,"scheme_name":"axis bluechip"}"#.to_string()),
            Ok("explained".to_string()),
        ]);
        assistant(model.clone(), false).respond(&ask("5000 a month in axis bluechip for a year")).await.unwrap();

        let figures: Value = serde_json::from_str(&model.last_user_turn()).unwrap();
        assert_eq!(figures["scheme_name"], json!("Axis Bluechip Fund - Direct Plan - Growth"));
        assert_eq!(figures["installments"], json!(12));
        assert_eq!(figures["total_invested"], json!(60000.0));
    }

    #[tokio::test]
    async fn test_sip_degrades_to_formula_when_history_fails() {
        let model = Scripted::new(vec![
            Ok(r#"{"intent":"sip","monthly_amount":5000,"years":10,"scheme_name":"axis bluechip"}"#.to_string()),
            Ok("explained".to_string()),
        ]);
        assistant(model.clone(), true).respond(&ask("5000 a month in axis bluechip")).await.unwrap();

        let figures: Value = serde_json::from_str(&model.last_user_turn()).unwrap();
        assert_eq!(figures["scheme_name"], json!(crate::services::sip::FORMULA_MODE_SCHEME));
        assert_eq!(figures["total_invested"], json!(600000.0));
    }

    #[tokio::test]
    async fn test_fund_info_attaches_snapshot() {
        let model = Scripted::new(vec![
            Ok(r#"{"intent":"mf","scheme_name":"Axis Bluechip"}"#.to_string()),
            Ok("fund explained".to_string()),
        ]);
        let reply = assistant(model.clone(), false).respond(&ask("Tell me about Axis Bluechip")).await.unwrap();
        assert_eq!(reply, "fund explained");

        let snapshot: Value = serde_json::from_str(&model.last_user_turn()).unwrap();
        assert_eq!(snapshot["scheme_code"], json!("120465"));
        assert_eq!(snapshot["latest_nav"], json!(63.0));
        // 2023-12-05 at 63 against 2022-12-05 at 51
        assert_eq!(snapshot["one_year_return_percent"], json!(23.53));
    }

    #[tokio::test]
    async fn test_failing_model_yields_apology() {
        let model = Scripted::new(vec![
            Err(ServiceError::UpstreamTimeout("intent".to_string())),
            Err(ServiceError::Upstream("general".to_string())),
        ]);
        let reply = assistant(model.clone(), false).respond(&ask("What is a mutual fund?")).await.unwrap();
        assert_eq!(reply, APOLOGY);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected() {
        let model = Scripted::new(vec![]);
        let err = assistant(model.clone(), false).respond(&ask("   ")).await.unwrap_err();
        assert!(matches!(err, ServiceError::InputValidation(_)));
        assert_eq!(model.calls(), 0);
    }
}
