use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Defines the supported OpenAI-compatible LLM backends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Gemini,
}

impl Provider {
    /// Base URL of the provider's OpenAI-compatible endpoint.
    pub fn api_base(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub tavily_api_key: String,
    pub chat_model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub tavily_max_results: u32,
    pub tavily_search_depth: String,
    pub max_history: usize,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
    pub log_level: Level,
    pub prompts_path: PathBuf,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    let raw = var_or(name, default);
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("'{}': {}", raw, e)))
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = parse_var::<SocketAddr>("BIND_ADDRESS", "0.0.0.0:8000")?;

        let provider = match var_or("LLM_PROVIDER", "openai").to_lowercase().as_str() {
            "gemini" => Provider::Gemini,
            _ => Provider::OpenAI,
        };

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok();
        let tavily_api_key = std::env::var("TAVILY_API_KEY")
            .map_err(|_| ConfigError::MissingVar("TAVILY_API_KEY".to_string()))?;

        let chat_model = var_or("CHAT_MODEL", "gpt-4o");

        let temperature = parse_var::<f32>("LLM_TEMPERATURE", "0.7")?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue(
                "LLM_TEMPERATURE".to_string(),
                format!("{} is outside 0..=2", temperature),
            ));
        }

        let max_tokens = match std::env::var("LLM_MAX_TOKENS") {
            Ok(raw) => Some(parse_var::<u32>("LLM_MAX_TOKENS", &raw)?).filter(|n| *n > 0),
            Err(_) => None,
        };

        let tavily_max_results = parse_var::<u32>("TAVILY_MAX_RESULTS", "10")?;
        if tavily_max_results == 0 {
            return Err(ConfigError::InvalidValue(
                "TAVILY_MAX_RESULTS".to_string(),
                "must be positive".to_string(),
            ));
        }
        let tavily_search_depth = var_or("TAVILY_SEARCH_DEPTH", "basic");

        let max_history = parse_var::<usize>("CHAT_MAX_HISTORY", "20")?;
        let cache_enabled = parse_var::<bool>("CACHE_ENABLE", "true")?;
        let cache_ttl = Duration::from_secs(parse_var::<u64>("PERSONA_CACHE_TTL_SECS", "86400")?);
        let request_timeout = Duration::from_secs(parse_var::<u64>("REQUEST_TIMEOUT_SECS", "30")?);

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = PathBuf::from(var_or("PROMPTS_PATH", "./prompts"));

        match provider {
            Provider::OpenAI => {
                if openai_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "OPENAI_API_KEY must be set for 'openai' provider".to_string(),
                    ));
                }
            }
            Provider::Gemini => {
                if gemini_api_key.is_none() {
                    return Err(ConfigError::MissingVar(
                        "GEMINI_API_KEY must be set for 'gemini' provider".to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            bind_address,
            provider,
            openai_api_key,
            gemini_api_key,
            tavily_api_key,
            chat_model,
            temperature,
            max_tokens,
            tavily_max_results,
            tavily_search_depth,
            max_history,
            cache_enabled,
            cache_ttl,
            request_timeout,
            log_level,
            prompts_path,
        })
    }

    /// API key for the selected LLM provider.
    pub fn llm_api_key(&self) -> Option<&str> {
        match self.provider {
            Provider::OpenAI => self.openai_api_key.as_deref(),
            Provider::Gemini => self.gemini_api_key.as_deref(),
        }
    }
}
