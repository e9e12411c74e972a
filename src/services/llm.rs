// src/services/llm.rs
use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{LlmConfig, LlmProvider};
use crate::models::ChatTurn;
use crate::services::error::{Result, ServiceError};

/// Shown to the user whenever the chat backend fails.
pub const APOLOGY: &str = "I'm having trouble responding right now. Try again!";

/// A chat-completion backend: ordered turns in, assistant reply out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, turns: &[ChatTurn]) -> Result<String>;
}

/// Runs a completion and swaps any failure for the fixed apology.
pub async fn complete_or_apologize(model: &dyn ChatModel, turns: &[ChatTurn]) -> String {
    match model.complete(turns).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("{} chat completion failed: {}", model.name(), e);
            APOLOGY.to_string()
        }
    }
}

/// Picks the backend named in the config.
pub fn build_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let model: Arc<dyn ChatModel> = match config.provider {
        LlmProvider::Ollama => Arc::new(OllamaChat::new(&config.ollama_base_url, &config.ollama_model, timeout)?),
        LlmProvider::Groq => Arc::new(GroqChat::new(
            &config.groq_base_url,
            &config.groq_model,
            config.groq_api_key.clone(),
            timeout,
        )?),
    };
    info!("Chat backend: {}", model.name());
    Ok(model)
}

/// Fire-and-forget first request so a local model is loaded before real traffic.
pub async fn warm_up(model: Arc<dyn ChatModel>) {
    match model.complete(&[ChatTurn::user("warmup")]).await {
        Ok(_) => info!("{} warmed up", model.name()),
        Err(e) => debug!("{} warm-up skipped: {}", model.name(), e),
    }
}

fn json_client(timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::Upstream(format!("Failed to build HTTP client: {}", e)))
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

fn to_messages(turns: &[ChatTurn]) -> Vec<Message> {
    turns
        .iter()
        .map(|t| Message { role: t.role.clone(), content: t.content.clone() })
        .collect()
}

// ── Ollama (local) ───────────────────────────────────────────────────────────

pub struct OllamaChat {
    http: Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<Message>,
}

impl OllamaChat {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: json_client(timeout)?,
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, turns: &[ChatTurn]) -> Result<String> {
        let request = OllamaChatRequest {
            model: self.model.clone(),
            messages: to_messages(turns),
            stream: false,
        };

        let response: OllamaChatResponse = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ServiceError::from_http("ollama chat", e))?
            .json()
            .await
            .map_err(|e| ServiceError::from_http("ollama chat", e))?;

        response
            .message
            .map(|m| m.content.trim().to_string())
            .ok_or_else(|| ServiceError::Upstream("Ollama response had no message content".to_string()))
    }
}

// ── Groq (OpenAI-compatible cloud API) ───────────────────────────────────────

pub struct GroqChat {
    http: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

impl GroqChat {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        if api_key.is_none() {
            warn!("$GROQ_API_KEY not set, chat replies will fall back to the apology message");
        }
        Ok(Self {
            http: json_client(timeout)?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ChatModel for GroqChat {
    fn name(&self) -> &str {
        "groq"
    }

    async fn complete(&self, turns: &[ChatTurn]) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ServiceError::Upstream("GROQ_API_KEY is not configured".to_string()))?;

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: to_messages(turns),
            temperature: 0.2,
            max_tokens: 300,
        };

        let response: CompletionResponse = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ServiceError::from_http("groq chat", e))?
            .json()
            .await
            .map_err(|e| ServiceError::from_http("groq chat", e))?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| ServiceError::Upstream("Groq response had no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl ChatModel for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn complete(&self, _turns: &[ChatTurn]) -> Result<String> {
            Err(ServiceError::UpstreamTimeout("groq chat: operation timed out".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failure_becomes_apology() {
        let reply = complete_or_apologize(&Broken, &[ChatTurn::user("hi")]).await;
        assert_eq!(reply, APOLOGY);
    }

    #[tokio::test]
    async fn test_groq_without_key_fails_before_network() {
        let groq = GroqChat::new("http://127.0.0.1:9", "m", None, Duration::from_secs(1)).unwrap();
        let err = groq.complete(&[ChatTurn::user("hi")]).await.unwrap_err();
        assert!(matches!(err, ServiceError::Upstream(_)));
    }

    #[test]
    fn test_endpoints() {
        let ollama = OllamaChat::new("http://localhost:11434/", "llama3", Duration::from_secs(1)).unwrap();
        assert_eq!(ollama.endpoint, "http://localhost:11434/api/chat");
        let groq = GroqChat::new("https://api.groq.com/openai/v1", "m", None, Duration::from_secs(1)).unwrap();
        assert_eq!(groq.endpoint, "https://api.groq.com/openai/v1/chat/completions");
    }

    #[test]
    fn test_parse_provider_payloads() {
        let ollama: OllamaChatResponse =
            serde_json::from_str(r#"{"model":"llama3","message":{"role":"assistant","content":" hello "},"done":true}"#)
                .unwrap();
        assert_eq!(ollama.message.unwrap().content, " hello ");

        let groq: CompletionResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"hi"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(groq.choices[0].message.content, "hi");
    }
}
