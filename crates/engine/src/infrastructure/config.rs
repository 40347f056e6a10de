//! Application configuration

use std::path::PathBuf;
use std::time::Duration;

/// Models tried in order when `MODEL_FALLBACKS` is not set.
pub const DEFAULT_MODEL_FALLBACKS: [&str; 3] =
    ["gemini-2.5-flash", "gemini-2.0-flash", "gemini-1.5-flash"];

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("{0} environment variable is required")]
    Missing(&'static str),
}

/// Application configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,

    /// Serve the deterministic narrator instead of calling the model API.
    pub testing: bool,

    /// Gemini API key; required unless `testing` is set.
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    /// Ordered model identifiers tried by the model invoker.
    pub model_fallbacks: Vec<String>,
    /// Per-call timeout of the model HTTP client.
    pub model_timeout: Duration,

    /// SQLite database file for campaigns, turns and state documents.
    pub database_path: String,

    /// Token budget for conversation history in prompts.
    pub history_token_budget: usize,
    /// Most recent turns always kept in prompts.
    pub keep_recent_turns: usize,

    /// Lore file used for campaigns created with the default world.
    pub world_lore_path: Option<PathBuf>,

    /// CORS allowed origins (comma-separated, or "*" for any)
    pub cors_allowed_origins: Option<String>,

    /// Client-side auth configuration. Accepted so deployments can share one
    /// environment file; the engine does not read it.
    pub firebase_config: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let testing = match var("TESTING") {
            Some(value) => parse_bool("TESTING", &value)?,
            None => false,
        };

        let gemini_api_key = var("GEMINI_API_KEY");
        if gemini_api_key.is_none() && !testing {
            return Err(ConfigError::Missing("GEMINI_API_KEY"));
        }

        let model_fallbacks = match var("MODEL_FALLBACKS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|model| !model.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_MODEL_FALLBACKS
                .iter()
                .map(|model| model.to_string())
                .collect(),
        };

        Ok(Self {
            server_host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parse_number("PORT", var("PORT"), 8081)?,
            testing,
            gemini_api_key,
            gemini_base_url: var("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            model_fallbacks,
            model_timeout: Duration::from_secs(parse_number(
                "MODEL_TIMEOUT_SECS",
                var("MODEL_TIMEOUT_SECS"),
                300,
            )?),
            database_path: var("DATABASE_PATH").unwrap_or_else(|| "worldarchitect.db".to_string()),
            history_token_budget: parse_number(
                "HISTORY_TOKEN_BUDGET",
                var("HISTORY_TOKEN_BUDGET"),
                40_000,
            )?,
            keep_recent_turns: parse_number("KEEP_RECENT_TURNS", var("KEEP_RECENT_TURNS"), 10)?,
            world_lore_path: var("WORLD_LORE_PATH").map(PathBuf::from),
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS"),
            firebase_config: var("FIREBASE_CONFIG"),
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name,
            expected: "a non-negative integer",
            value,
        }),
        None => Ok(default),
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            expected: "a boolean",
            value: value.to_string(),
        }),
    }
}
