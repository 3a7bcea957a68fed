//! Configuration management for the agent server.
//!
//! Configuration can be set via environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `DEFAULT_PROVIDER` - Optional. One of `openai`, `anthropic`, `google`, `aipipe`. Defaults to `openai`.
//! - `DEFAULT_MODEL` - Optional. Defaults to `gpt-4o-mini`.
//! - `MAX_CONVERSATION_LEN` - Optional. Conversation entry cap. Defaults to `50`.
//! - `MAX_MESSAGE_CHARS` - Optional. Per-message content cap. Defaults to `5000`.
//! - `OUTBOUND_WINDOW` - Optional. Entries sent per provider call. Defaults to `20`.
//! - `MAX_CACHE_ENTRIES` - Optional. Search cache entry cap. Defaults to `100`.
//! - `CACHE_TTL_SECS` - Optional. Search cache freshness window. Defaults to `600`.
//! - `SEARCH_COOLDOWN_MS` - Optional. Minimum interval between searches. Defaults to `1000`.
//! - `SANDBOX_TIMEOUT_SECS` - Optional. Wall-clock bound for code execution. Defaults to `8`.
//!
//! No credential is read from the environment: LLM and search credentials ride
//! on every request, and their absence selects demo mode rather than an error.

use std::time::Duration;

use thiserror::Error;

use crate::llm::Provider;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Every numeric bound the memory manager, gateway, and tools enforce.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Conversation entry cap (anchor + most recent).
    pub max_conversation_len: usize,

    /// Per-message content cap; longer content gets a visible marker.
    pub max_message_chars: usize,

    /// User input cap applied before a turn starts.
    pub max_input_chars: usize,

    /// How many trailing entries go out per provider call.
    pub outbound_window: usize,

    /// Provider-returned content cap before it re-enters the conversation.
    pub max_content_chars: usize,

    /// Search cache entry cap.
    pub max_cache_entries: usize,

    /// Search cache freshness window.
    pub cache_ttl: Duration,

    /// Rendered message elements a collaborator UI should keep.
    pub rendered_cap: usize,

    /// Minimum interval between consecutive search invocations.
    pub search_cooldown: Duration,

    /// Background sweep interval.
    pub sweep_interval: Duration,

    /// Safety backstop on think/execute cycles within one turn.
    pub max_loop_iterations: usize,

    /// Timeout for a single provider call.
    pub provider_timeout: Duration,

    /// Timeout for a single tool execution.
    pub tool_timeout: Duration,

    /// Wall-clock bound for sandboxed code execution.
    pub sandbox_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_conversation_len: 50,
            max_message_chars: 5000,
            max_input_chars: 2000,
            outbound_window: 20,
            max_content_chars: 8000,
            max_cache_entries: 100,
            cache_ttl: Duration::from_secs(600),
            rendered_cap: 50,
            search_cooldown: Duration::from_millis(1000),
            sweep_interval: Duration::from_secs(60),
            max_loop_iterations: 10,
            provider_timeout: Duration::from_secs(30),
            tool_timeout: Duration::from_secs(10),
            sandbox_timeout: Duration::from_secs(8),
        }
    }
}

impl Limits {
    /// Tight bounds for tests: no second-scale sleeps, short freshness window.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            search_cooldown: Duration::from_millis(10),
            cache_ttl: Duration::from_millis(200),
            sweep_interval: Duration::from_millis(50),
            sandbox_timeout: Duration::from_secs(3),
            ..Self::default()
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Provider used when a request doesn't name one
    pub default_provider: Provider,

    /// Model used when a request doesn't name one
    pub default_model: String,

    /// All enforced bounds
    pub limits: Limits,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = parse_env("PORT", 3000u16)?;

        let default_provider = match std::env::var("DEFAULT_PROVIDER") {
            Ok(v) => v
                .parse::<Provider>()
                .map_err(|e| ConfigError::InvalidValue("DEFAULT_PROVIDER".to_string(), e))?,
            Err(_) => Provider::OpenAI,
        };

        let default_model =
            std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let defaults = Limits::default();
        let limits = Limits {
            max_conversation_len: parse_env("MAX_CONVERSATION_LEN", defaults.max_conversation_len)?,
            max_message_chars: parse_env("MAX_MESSAGE_CHARS", defaults.max_message_chars)?,
            outbound_window: parse_env("OUTBOUND_WINDOW", defaults.outbound_window)?,
            max_cache_entries: parse_env("MAX_CACHE_ENTRIES", defaults.max_cache_entries)?,
            cache_ttl: Duration::from_secs(parse_env(
                "CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )?),
            search_cooldown: Duration::from_millis(parse_env(
                "SEARCH_COOLDOWN_MS",
                defaults.search_cooldown.as_millis() as u64,
            )?),
            sandbox_timeout: Duration::from_secs(parse_env(
                "SANDBOX_TIMEOUT_SECS",
                defaults.sandbox_timeout.as_secs(),
            )?),
            ..defaults
        };

        Ok(Self {
            host,
            port,
            default_provider,
            default_model,
            limits,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            default_provider: Provider::OpenAI,
            default_model: "gpt-4o-mini".to_string(),
            limits: Limits::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_bounds() {
        let limits = Limits::default();
        assert_eq!(limits.max_conversation_len, 50);
        assert_eq!(limits.max_message_chars, 5000);
        assert_eq!(limits.outbound_window, 20);
        assert_eq!(limits.cache_ttl, Duration::from_secs(600));
        assert_eq!(limits.search_cooldown, Duration::from_millis(1000));
    }
}
