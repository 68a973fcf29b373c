use std::path::PathBuf;
use std::time::Duration;

use hooktrack_client::resource::DEFAULT_API_KEY_HEADER;
use hooktrack_core::error::CoreError;
use hooktrack_core::polling::{BackoffMode, PollingConfig};

/// Default location of the JSON handle store.
pub const DEFAULT_STATE_FILE: &str = ".hooktrack/handles.json";

/// Default per-request HTTP timeout.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Tracker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub webhook_url: Option<String>,
    /// Fallback status URL template for the endpoint fetcher.
    pub status_url_template: Option<String>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub api_key_header: String,
    pub polling: PollingConfig,
    pub request_timeout: Duration,
    pub state_file: PathBuf,
    /// When set, handles are persisted in Postgres instead of the file.
    pub database_url: Option<String>,
}

impl TrackerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                   |
    /// |----------------------------------|---------------------------|
    /// | `HOOKTRACK_WEBHOOK_URL`          | --                        |
    /// | `HOOKTRACK_STATUS_URL_TEMPLATE`  | --                        |
    /// | `HOOKTRACK_API_URL`              | --                        |
    /// | `HOOKTRACK_API_KEY`              | --                        |
    /// | `HOOKTRACK_API_KEY_HEADER`       | `X-N8N-API-KEY`           |
    /// | `HOOKTRACK_POLL_INTERVAL_MS`     | `2000`                    |
    /// | `HOOKTRACK_POLL_TIMEOUT_SECS`    | `300`                     |
    /// | `HOOKTRACK_POLL_MAX_ATTEMPTS`    | unbounded                 |
    /// | `HOOKTRACK_BACKOFF`              | `fixed`                   |
    /// | `HOOKTRACK_POLL_MAX_INTERVAL_MS` | `30000`                   |
    /// | `HOOKTRACK_REQUEST_TIMEOUT_SECS` | `30`                      |
    /// | `HOOKTRACK_STATE_FILE`           | `.hooktrack/handles.json` |
    /// | `DATABASE_URL`                   | --                        |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut polling = PollingConfig::default();
        if let Some(ms) = parse_var::<u64>(&var, "HOOKTRACK_POLL_INTERVAL_MS")? {
            polling.base_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(&var, "HOOKTRACK_POLL_TIMEOUT_SECS")? {
            polling.timeout = Duration::from_secs(secs);
        }
        polling.max_attempts = parse_var::<u32>(&var, "HOOKTRACK_POLL_MAX_ATTEMPTS")?;
        if let Some(mode) = var("HOOKTRACK_BACKOFF") {
            polling.backoff_mode = BackoffMode::parse(&mode)?;
        }
        if let Some(ms) = parse_var::<u64>(&var, "HOOKTRACK_POLL_MAX_INTERVAL_MS")? {
            polling.max_interval = Duration::from_millis(ms);
        }

        let request_timeout_secs = parse_var::<u64>(&var, "HOOKTRACK_REQUEST_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        Ok(Self {
            webhook_url: var("HOOKTRACK_WEBHOOK_URL"),
            status_url_template: var("HOOKTRACK_STATUS_URL_TEMPLATE"),
            api_url: var("HOOKTRACK_API_URL"),
            api_key: var("HOOKTRACK_API_KEY"),
            api_key_header: var("HOOKTRACK_API_KEY_HEADER")
                .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string()),
            polling,
            request_timeout: Duration::from_secs(request_timeout_secs),
            state_file: var("HOOKTRACK_STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            database_url: var("DATABASE_URL"),
        })
    }

    /// Whether the execution API variant should be used for status checks.
    pub fn uses_execution_api(&self) -> bool {
        self.api_url.is_some() && self.api_key.is_some()
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, CoreError> {
    var(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| CoreError::Validation(format!("{key} must be a valid number, got '{raw}'")))
        })
        .transpose()
}
