//! Runtime configuration.
//!
//! All configuration comes from environment variables, resolved once at
//! startup. Required identifiers are validated before anything connects to
//! the network; a missing token fails the process immediately rather than
//! at the first message.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default maximum submit+poll attempts for one assistant exchange.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-attempt timeout for an assistant run, in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// Default Telegram Bot API base URL.
pub const DEFAULT_TELEGRAM_API_BASE_URL: &str = "https://api.telegram.org";

/// Default OpenAI API base URL.
pub const DEFAULT_OPENAI_API_BASE_URL: &str = "https://api.openai.com";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variables: {vars}")]
    MissingVars { vars: String },

    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Resolved runtime configuration.
#[derive(Clone)]
pub struct Config {
    /// Telegram bot token.
    pub telegram_token: String,
    /// OpenAI API key.
    pub openai_api_key: String,
    /// Assistant identifier runs are started against.
    pub assistant_id: String,
    /// Maximum submit+poll attempts per exchange.
    pub max_retries: u32,
    /// Per-attempt run timeout.
    pub timeout: Duration,
    /// User ids allowed to use the bot. Empty means everyone.
    pub allowed_users: Vec<i64>,
    /// Directory for thread persistence and the exchange audit log.
    pub state_dir: PathBuf,
    /// SQLite database path for the thread store.
    pub thread_db_path: PathBuf,
    /// Telegram Bot API base URL (overridable for tests/proxies).
    pub telegram_api_base_url: String,
    /// OpenAI API base URL (overridable for tests/proxies).
    pub openai_api_base_url: String,
}

impl Config {
    /// Load configuration from the environment, failing fast when any
    /// required variable is absent or unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let telegram_token = env::var("TELEGRAM_TOKEN").ok().filter(|v| !v.is_empty());
        let openai_api_key = env::var("OPENAI_API_KEY").ok().filter(|v| !v.is_empty());
        let assistant_id = env::var("ASSISTANT_ID").ok().filter(|v| !v.is_empty());

        let missing: Vec<&str> = [
            ("TELEGRAM_TOKEN", telegram_token.is_none()),
            ("OPENAI_API_KEY", openai_api_key.is_none()),
            ("ASSISTANT_ID", assistant_id.is_none()),
        ]
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            return Err(ConfigError::MissingVars {
                vars: missing.join(", "),
            });
        }

        let max_retries = parse_env("MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        let timeout_seconds = parse_env("TIMEOUT_SECONDS", DEFAULT_TIMEOUT_SECONDS)?;
        let allowed_users = parse_allowed_users(env::var("ALLOWED_USERS").ok().as_deref())?;

        let state_dir = resolve_state_dir();
        let thread_db_path = env::var("THREAD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| state_dir.join("threads.db"));

        Ok(Self {
            telegram_token: telegram_token.unwrap_or_default(),
            openai_api_key: openai_api_key.unwrap_or_default(),
            assistant_id: assistant_id.unwrap_or_default(),
            max_retries,
            timeout: Duration::from_secs(timeout_seconds),
            allowed_users,
            state_dir,
            thread_db_path,
            telegram_api_base_url: env::var("TELEGRAM_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_TELEGRAM_API_BASE_URL.to_string()),
            openai_api_base_url: env::var("OPENAI_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_API_BASE_URL.to_string()),
        })
    }

    /// Whether the given user may use the bot.
    pub fn is_user_allowed(&self, user_id: i64) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(&user_id)
    }
}

/// Resolve the state directory.
/// Priority: RELAYBOT_STATE_DIR > ~/.relaybot > ./.relaybot
pub fn resolve_state_dir() -> PathBuf {
    if let Ok(dir) = env::var("RELAYBOT_STATE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|p| p.join(".relaybot"))
        .unwrap_or_else(|| PathBuf::from(".relaybot"))
}

fn parse_env<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                var: var.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated list of numeric user ids.
fn parse_allowed_users(raw: Option<&str>) -> Result<Vec<i64>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let mut users = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let id = part.parse::<i64>().map_err(|e| ConfigError::InvalidValue {
            var: "ALLOWED_USERS".to_string(),
            message: format!("{part:?}: {e}"),
        })?;
        users.push(id);
    }
    Ok(users)
}

// Tokens never appear in logs even when the config is printed at startup.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("telegram_token", &mask(&self.telegram_token))
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("assistant_id", &self.assistant_id)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .field("allowed_users", &self.allowed_users)
            .field("state_dir", &self.state_dir)
            .field("thread_db_path", &self.thread_db_path)
            .field("telegram_api_base_url", &self.telegram_api_base_url)
            .field("openai_api_base_url", &self.openai_api_base_url)
            .finish()
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "**********"
    }
}
