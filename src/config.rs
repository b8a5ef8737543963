use std::time::Duration;
use tracing::warn;

// ── Session Defaults ────────────────────────────────────────────────────────

pub const DEFAULT_START_DATE: &str = "2020-01-01";
pub const DEFAULT_END_DATE: &str = "2020-02-01";
pub const DEFAULT_STARTING_AMOUNT: f64 = 1000.0;

/// Accepted date format for every date field.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Literal accepted in the end-date field, resolved to today's date.
pub const END_DATE_NOW: &str = "now";

// ── Market Data ─────────────────────────────────────────────────────────────

pub const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
/// One request per fetch; raise through STOCKVIZ_FETCH_ATTEMPTS to retry.
pub const DEFAULT_FETCH_ATTEMPTS: usize = 1;
pub const FETCH_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const USER_AGENT: &str = "Mozilla/5.0";

pub const ENV_DATA_PROVIDER: &str = "STOCKVIZ_DATA_PROVIDER";
pub const ENV_YAHOO_BASE_URL: &str = "STOCKVIZ_YAHOO_BASE_URL";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "STOCKVIZ_FETCH_TIMEOUT_SECS";
pub const ENV_FETCH_ATTEMPTS: &str = "STOCKVIZ_FETCH_ATTEMPTS";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataProviderMode {
    Yfinance,
    Synthetic,
}

impl DataProviderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yfinance => "yfinance",
            Self::Synthetic => "synthetic",
        }
    }
}

pub fn parse_provider_mode(raw: &str) -> DataProviderMode {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yfinance" | "yahoo" | "" => DataProviderMode::Yfinance,
        "synthetic" | "mock" => DataProviderMode::Synthetic,
        other => {
            warn!(
                "Unknown {}={} ; defaulting to yfinance. Allowed values: yfinance | synthetic",
                ENV_DATA_PROVIDER,
                other
            );
            DataProviderMode::Yfinance
        }
    }
}

/// Runtime settings resolved from the environment (and `.env`, loaded in main).
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub provider: DataProviderMode,
    pub yahoo_base_url: String,
    pub fetch_timeout: Duration,
    pub fetch_attempts: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: DataProviderMode::Yfinance,
            yahoo_base_url: DEFAULT_YAHOO_BASE_URL.to_string(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let provider = non_empty(ENV_DATA_PROVIDER)
            .map(|v| parse_provider_mode(&v))
            .unwrap_or(defaults.provider);

        let yahoo_base_url = non_empty(ENV_YAHOO_BASE_URL)
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(defaults.yahoo_base_url);

        let fetch_timeout = match non_empty(ENV_FETCH_TIMEOUT_SECS) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    warn!("Ignoring invalid {}={}", ENV_FETCH_TIMEOUT_SECS, raw);
                    defaults.fetch_timeout
                }
            },
            None => defaults.fetch_timeout,
        };

        let fetch_attempts = match non_empty(ENV_FETCH_ATTEMPTS) {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!("Ignoring invalid {}={}", ENV_FETCH_ATTEMPTS, raw);
                    defaults.fetch_attempts
                }
            },
            None => defaults.fetch_attempts,
        };

        Self {
            provider,
            yahoo_base_url,
            fetch_timeout,
            fetch_attempts,
        }
    }
}
