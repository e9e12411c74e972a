// src/config.rs
use log::warn;
use std::env;
use std::str::FromStr;

/// Top-level application configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub mfapi: MfApiConfig,
    /// Fuzzy matches scoring below this are rejected (0 accepts any best match).
    pub match_min_score: f64,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone)]
pub struct MfApiConfig {
    pub base_url: String,
    pub catalog_timeout_secs: u64,
    pub history_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Groq,
    Ollama,
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(LlmProvider::Groq),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(format!("unknown LLM provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub timeout_secs: u64,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub groq_base_url: String,
    pub groq_model: String,
    pub groq_api_key: Option<String>,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MFAPI_BASE_URL: &str = "https://api.mfapi.in";
const DEFAULT_CATALOG_TIMEOUT_SECS: u64 = 20;
const DEFAULT_HISTORY_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MATCH_MIN_SCORE: f64 = 50.0;
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 300;
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3";
const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_GROQ_MODEL: &str = "llama3-70b-8192";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            mfapi: MfApiConfig {
                base_url: DEFAULT_MFAPI_BASE_URL.to_string(),
                catalog_timeout_secs: DEFAULT_CATALOG_TIMEOUT_SECS,
                history_timeout_secs: DEFAULT_HISTORY_TIMEOUT_SECS,
            },
            match_min_score: DEFAULT_MATCH_MIN_SCORE,
            llm: LlmConfig {
                provider: LlmProvider::Groq,
                timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
                ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
                ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
                groq_base_url: DEFAULT_GROQ_BASE_URL.to_string(),
                groq_model: DEFAULT_GROQ_MODEL.to_string(),
                groq_api_key: None,
            },
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Loads `.env` (if present) and then reads every setting from the environment.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();
        let text = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        Self {
            port: parsed(&lookup, "PORT", defaults.port),
            mfapi: MfApiConfig {
                base_url: text("MFAPI_BASE_URL", defaults.mfapi.base_url),
                catalog_timeout_secs: parsed(&lookup, "CATALOG_TIMEOUT_SECS", defaults.mfapi.catalog_timeout_secs),
                history_timeout_secs: parsed(&lookup, "HISTORY_TIMEOUT_SECS", defaults.mfapi.history_timeout_secs),
            },
            match_min_score: parsed(&lookup, "MATCH_MIN_SCORE", defaults.match_min_score),
            llm: LlmConfig {
                provider: parsed(&lookup, "LLM_PROVIDER", defaults.llm.provider),
                timeout_secs: parsed(&lookup, "LLM_TIMEOUT_SECS", defaults.llm.timeout_secs),
                ollama_base_url: text("OLLAMA_BASE_URL", defaults.llm.ollama_base_url),
                ollama_model: text("OLLAMA_MODEL", defaults.llm.ollama_model),
                groq_base_url: text("GROQ_BASE_URL", defaults.llm.groq_base_url),
                groq_model: text("GROQ_MODEL", defaults.llm.groq_model),
                groq_api_key: lookup("GROQ_API_KEY").filter(|k| !k.trim().is_empty()),
            },
        }
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("${} has invalid value '{}', defaulting to {:?}", key, raw, default);
            default
        }),
    }
}
