//! Runtime configuration
//!
//! Read once at startup from the environment (after `.env` is loaded).

use crate::error::OrchestrationError;
use crate::execution::{LoopConfig, DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_ROUND_TIMEOUT};
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CONTINUATION_TTL_SECS: i64 = 600;
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// Knobs of the conversation state machine
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_tool_rounds: usize,
    pub round_timeout: Duration,
    /// Age after which a pending continuation no longer diverts routing
    pub continuation_ttl: chrono::Duration,
    /// Recent turns sent to the model with each exchange
    pub history_window: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            round_timeout: DEFAULT_ROUND_TIMEOUT,
            continuation_ttl: chrono::Duration::seconds(DEFAULT_CONTINUATION_TTL_SECS),
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

impl OrchestratorConfig {
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            max_tool_rounds: self.max_tool_rounds,
            round_timeout: self.round_timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub database_url: Option<String>,
    pub port: u16,
    pub slack_bot_token: Option<String>,
    pub orchestrator: OrchestratorConfig,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &str) -> Result<Option<T>> {
    match var(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            OrchestrationError::ConfigError(format!("{} has an invalid value: '{}'", name, raw))
        }),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = OrchestratorConfig::default();

        let port = match parsed::<u16>("PORT")? {
            Some(port) => port,
            None => parsed::<u16>("API_PORT")?.unwrap_or(DEFAULT_PORT),
        };

        let max_tool_rounds = parsed::<usize>("MAX_TOOL_ROUNDS")?.unwrap_or(defaults.max_tool_rounds);
        if max_tool_rounds == 0 {
            return Err(OrchestrationError::ConfigError(
                "MAX_TOOL_ROUNDS must be at least 1".to_string(),
            ));
        }

        let orchestrator = OrchestratorConfig {
            max_tool_rounds,
            round_timeout: parsed::<u64>("MODEL_ROUND_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.round_timeout),
            continuation_ttl: parsed::<i64>("CONTINUATION_TTL_SECS")?
                .map(chrono::Duration::seconds)
                .unwrap_or(defaults.continuation_ttl),
            history_window: parsed::<usize>("HISTORY_WINDOW")?.unwrap_or(defaults.history_window),
        };

        Ok(Self {
            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            database_url: var("DATABASE_URL").or_else(|| var("POSTGRES_URL")),
            port,
            slack_bot_token: var("SLACK_BOT_TOKEN"),
            orchestrator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_tool_rounds, 6);
        assert_eq!(config.round_timeout, Duration::from_secs(30));
        assert_eq!(config.continuation_ttl, chrono::Duration::minutes(10));
        assert_eq!(config.loop_config().max_tool_rounds, 6);
    }

    // Single test touching the process environment to avoid races between tests
    #[test]
    fn test_from_env() {
        env::set_var("HISTORY_WINDOW", "8");
        env::set_var("CONTINUATION_TTL_SECS", "60");
        env::set_var("GEMINI_MODEL", "gemini-test");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.orchestrator.history_window, 8);
        assert_eq!(config.orchestrator.continuation_ttl, chrono::Duration::seconds(60));
        assert_eq!(config.gemini_model, "gemini-test");

        env::set_var("MAX_TOOL_ROUNDS", "many");
        assert!(matches!(
            AppConfig::from_env(),
            Err(OrchestrationError::ConfigError(_))
        ));

        for name in ["HISTORY_WINDOW", "CONTINUATION_TTL_SECS", "GEMINI_MODEL", "MAX_TOOL_ROUNDS"] {
            env::remove_var(name);
        }
    }
}
