use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RelayError, Result};

pub const PRACTICUM_TOKEN: &str = "PRACTICUM_TOKEN";
pub const TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
pub const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

const ENDPOINT_VAR: &str = "PRACTICUM_ENDPOINT";
const TELEGRAM_API_URL_VAR: &str = "TELEGRAM_API_URL";
const RETRY_PERIOD_VAR: &str = "RETRY_PERIOD_SECS";
const HTTP_TIMEOUT_VAR: &str = "HTTP_TIMEOUT_SECS";
const LOG_FILE_VAR: &str = "RELAY_LOG_FILE";

const REQUIRED: [&str; 3] = [PRACTICUM_TOKEN, TELEGRAM_TOKEN, TELEGRAM_CHAT_ID];

fn default_endpoint() -> String {
    "https://practicum.yandex.ru/api/user_api/homework_statuses/".to_string()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_retry_period_secs() -> u64 {
    600
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_log_file() -> PathBuf {
    PathBuf::from("main.log")
}

/// Runtime configuration, read from the process environment.
///
/// The three tokens are required; everything else has a default.
#[derive(Clone)]
pub struct RelayConfig {
    pub practicum_token: String,
    pub telegram_token: String,
    pub telegram_chat_id: String,
    pub endpoint: String,
    pub telegram_api_url: String,
    pub retry_period: Duration,
    /// Upper bound on one HTTP request, so a hung call cannot outlive a
    /// stop signal by more than this.
    pub http_timeout: Duration,
    pub log_file: PathBuf,
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("practicum_token", &"<redacted>")
            .field("telegram_token", &"<redacted>")
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("endpoint", &self.endpoint)
            .field("telegram_api_url", &self.telegram_api_url)
            .field("retry_period", &self.retry_period)
            .field("http_timeout", &self.http_timeout)
            .field("log_file", &self.log_file)
            .finish()
    }
}

impl RelayConfig {
    /// Names of the required variables absent from `lookup`.
    ///
    /// Empty or whitespace-only values count as absent.
    pub fn missing_required<F>(lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        REQUIRED
            .iter()
            .filter(|name| non_empty(&lookup, name).is_none())
            .map(|name| name.to_string())
            .collect()
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let missing = Self::missing_required(&lookup);
        if !missing.is_empty() {
            return Err(RelayError::MissingConfig(missing));
        }

        let required = |name: &str| non_empty(&lookup, name).unwrap_or_default();

        let retry_secs = match non_empty(&lookup, RETRY_PERIOD_VAR) {
            Some(raw) => parse_secs(RETRY_PERIOD_VAR, &raw)?,
            None => default_retry_period_secs(),
        };
        let timeout_secs = match non_empty(&lookup, HTTP_TIMEOUT_VAR) {
            Some(raw) => parse_secs(HTTP_TIMEOUT_VAR, &raw)?,
            None => default_http_timeout_secs(),
        };

        Ok(Self {
            practicum_token: required(PRACTICUM_TOKEN),
            telegram_token: required(TELEGRAM_TOKEN),
            telegram_chat_id: required(TELEGRAM_CHAT_ID),
            endpoint: non_empty(&lookup, ENDPOINT_VAR).unwrap_or_else(default_endpoint),
            telegram_api_url: non_empty(&lookup, TELEGRAM_API_URL_VAR)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(default_telegram_api_url),
            retry_period: Duration::from_secs(retry_secs),
            http_timeout: Duration::from_secs(timeout_secs),
            log_file: non_empty(&lookup, LOG_FILE_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(default_log_file),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Log file location, resolvable before the tokens are validated.
    pub fn log_file_from_env() -> PathBuf {
        non_empty(&|name: &str| std::env::var(name).ok(), LOG_FILE_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(default_log_file)
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|value| !value.trim().is_empty())
}

/// Whole, positive seconds.
fn parse_secs(name: &str, raw: &str) -> Result<u64> {
    let invalid = |reason: &str| RelayError::InvalidConfig {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(&format!("expected whole seconds, got {raw:?}")))?;
    if secs == 0 {
        return Err(invalid("must be greater than zero"));
    }
    Ok(secs)
}
