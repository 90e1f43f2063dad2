use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_TABLE_NAME: &str = "wakaba-production-todo";
const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_TITLE_TIMEOUT_SECS: u64 = 5;

/// Everything the function reads from its environment, resolved once at cold start.
///
/// The gateway path needs `public_key`, the worker path needs `bot_token`; each
/// path reports its own missing setting so a half-configured deployment can
/// still answer the other kind of event.
#[derive(Debug, Clone)]
pub struct Config {
    pub public_key: Option<String>,
    pub bot_token: Option<String>,
    pub function_name: Option<String>,
    pub queue_url: Option<String>,
    pub table_name: String,
    pub discord_api_base: String,
    pub control_secret: Option<String>,
    pub title_timeout: Duration,
    pub title_concurrency: Option<usize>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let title_timeout_secs = parse_or(&get, "TITLE_FETCH_TIMEOUT_SECS", DEFAULT_TITLE_TIMEOUT_SECS)?;
        let title_concurrency = match get("TITLE_FETCH_CONCURRENCY") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(0) | Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        key: "TITLE_FETCH_CONCURRENCY".to_string(),
                        message: format!("expected a positive integer, got {raw:?}"),
                    })
                }
                Ok(n) => Some(n),
            },
            None => None,
        };

        Ok(Self {
            public_key: get("DISCORD_PUBLIC_KEY"),
            bot_token: get("DISCORD_BOT_TOKEN"),
            function_name: get("AWS_LAMBDA_FUNCTION_NAME"),
            queue_url: get("WAKABA_QUEUE_URL"),
            table_name: get("DYNAMODB_TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            discord_api_base: get("DISCORD_API_BASE")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            control_secret: get("TODO_CONTROL_SECRET"),
            title_timeout: Duration::from_secs(title_timeout_secs),
            title_concurrency,
        })
    }
}

fn parse_or<G>(get: &G, key: &str, default: u64) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{e}"),
            })
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}
