use anyhow::{Context, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    /// Bearer token injected on every request when present.
    pub api_token: Option<String>,
    pub http_timeout_secs: u64,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            api_base_url: require_env("API_BASE_URL")?,
            api_token: optional_env("API_TOKEN"),
            http_timeout_secs: parse_timeout(std::env::var("HTTP_TIMEOUT_SECS").ok())?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_timeout(raw: Option<String>) -> Result<u64> {
    match raw {
        None => Ok(DEFAULT_TIMEOUT_SECS),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .context("HTTP_TIMEOUT_SECS must be a whole number of seconds"),
    }
}
